use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

/// Lists `devices` and reads indices from `input` until one names a listed
/// device. Anything else re-prompts; end of input is an error.
pub fn choose_device<R: BufRead, W: Write>(
    kind: &str,
    devices: &BTreeMap<usize, String>,
    input: &mut R,
    output: &mut W,
) -> Result<usize> {
    if devices.is_empty() {
        bail!("no {kind} devices available");
    }
    let mut line = String::new();
    loop {
        writeln!(output, "Select the {kind} device by number:")?;
        for (index, name) in devices {
            writeln!(output, "{index:03} : {name}")?;
        }
        output.flush()?;

        line.clear();
        let read = input
            .read_line(&mut line)
            .with_context(|| format!("failed to read {kind} device selection"))?;
        if read == 0 {
            bail!("input closed before a {kind} device was chosen");
        }
        match line.trim().parse::<usize>() {
            Ok(index) if devices.contains_key(&index) => return Ok(index),
            _ => writeln!(output, "'{}' is not a listed {kind} device", line.trim())?,
        }
    }
}
