use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Where configuration and trained artifacts live under a data root.
///
/// ```text
/// conf/speaker/<speaker>.json
/// conf/pair/<source>-<target>.json
/// data/pair/<source>-<target>/model/GMM_mcep.json
/// data/pair/<source>-<target>/model/cvgv.json
/// data/pair/<source>-<target>/stats/<speaker>.json
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The platform data directory, or the working directory if there is
    /// no home directory to put it in.
    pub fn default_root() -> PathBuf {
        ProjectDirs::from("", "", "voxmorph")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn speaker_config(&self, speaker: &str) -> PathBuf {
        self.root.join("conf").join("speaker").join(format!("{speaker}.json"))
    }

    pub fn pair_config(&self, source: &str, target: &str) -> PathBuf {
        self.root.join("conf").join("pair").join(format!("{}.json", pair_name(source, target)))
    }

    fn pair_dir(&self, source: &str, target: &str) -> PathBuf {
        self.root.join("data").join("pair").join(pair_name(source, target))
    }

    pub fn gmm_model(&self, source: &str, target: &str) -> PathBuf {
        self.pair_dir(source, target).join("model").join("GMM_mcep.json")
    }

    pub fn cvgv(&self, source: &str, target: &str) -> PathBuf {
        self.pair_dir(source, target).join("model").join("cvgv.json")
    }

    pub fn speaker_stats(&self, source: &str, target: &str, speaker: &str) -> PathBuf {
        self.pair_dir(source, target).join("stats").join(format!("{speaker}.json"))
    }
}

fn pair_name(source: &str, target: &str) -> String {
    format!("{source}-{target}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let layout = DataLayout::new("/srv/vc");
        assert_eq!(layout.speaker_config("alice"), Path::new("/srv/vc/conf/speaker/alice.json"));
        assert_eq!(layout.pair_config("alice", "bob"), Path::new("/srv/vc/conf/pair/alice-bob.json"));
        assert_eq!(
            layout.gmm_model("alice", "bob"),
            Path::new("/srv/vc/data/pair/alice-bob/model/GMM_mcep.json")
        );
        assert_eq!(layout.cvgv("alice", "bob"), Path::new("/srv/vc/data/pair/alice-bob/model/cvgv.json"));
        assert_eq!(
            layout.speaker_stats("alice", "bob", "bob"),
            Path::new("/srv/vc/data/pair/alice-bob/stats/bob.json")
        );
    }
}
