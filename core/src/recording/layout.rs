use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// On-disk layout of one session directory.
///
/// ```text
/// session_<id>/
///   metadata.json          finalized atomically at stop
///   timeline.csv           one row per recorded frame set
///   raw/radar.bin          fixed-length raw cube records, appended
///   heatmaps/rd/NNNNN.bin  tagged numeric arrays
///   heatmaps/ra/NNNNN.bin
///   imaging/NNNNN.bin
///   landmarks/NNNNN.json
/// ```
#[derive(Debug, Clone)]
pub struct SessionLayout {
    root: PathBuf,
}

impl SessionLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.root.join("raw"),
            self.root.join("heatmaps").join("rd"),
            self.root.join("heatmaps").join("ra"),
            self.root.join("imaging"),
            self.root.join("landmarks"),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    /// Staging file for the atomic metadata rename.
    pub fn metadata_tmp_path(&self) -> PathBuf {
        self.root.join("metadata.json.tmp")
    }

    pub fn timeline_path(&self) -> PathBuf {
        self.root.join("timeline.csv")
    }

    pub fn raw_radar_path(&self) -> PathBuf {
        self.root.join("raw").join("radar.bin")
    }

    pub fn rd_heatmap_path(&self, sequence: u64) -> PathBuf {
        self.root
            .join("heatmaps")
            .join("rd")
            .join(format!("{:05}.bin", sequence))
    }

    pub fn ra_heatmap_path(&self, sequence: u64) -> PathBuf {
        self.root
            .join("heatmaps")
            .join("ra")
            .join(format!("{:05}.bin", sequence))
    }

    pub fn imaging_path(&self, sequence: u64) -> PathBuf {
        self.root.join("imaging").join(format!("{:05}.bin", sequence))
    }

    pub fn landmarks_path(&self, sequence: u64) -> PathBuf {
        self.root
            .join("landmarks")
            .join(format!("{:05}.json", sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_builds_the_whole_tree() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SessionLayout::new(dir.path().join("session_test"));
        layout.create().unwrap();
        assert!(layout.root().is_dir());
        assert!(layout.rd_heatmap_path(1).parent().unwrap().is_dir());
        assert!(layout.ra_heatmap_path(1).parent().unwrap().is_dir());
        assert!(layout.imaging_path(1).parent().unwrap().is_dir());
        assert!(layout.landmarks_path(1).parent().unwrap().is_dir());
        assert!(layout.raw_radar_path().parent().unwrap().is_dir());
    }

    #[test]
    fn frame_paths_are_zero_padded() {
        let layout = SessionLayout::new(PathBuf::from("/tmp/session_x"));
        assert!(layout
            .rd_heatmap_path(42)
            .to_string_lossy()
            .ends_with("heatmaps/rd/00042.bin"));
        assert!(layout
            .landmarks_path(7)
            .to_string_lossy()
            .ends_with("landmarks/00007.json"));
    }
}
