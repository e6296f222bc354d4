use crate::{ProgressEvent, Transfer};

/// Which transfer counters drive the combined progress value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProgressMode {
    Upload,
    Download,
    #[default]
    Both,
}

/// `round(loaded * 100 / total)`, clamped to 100. `None` when the total
/// length is unknown or zero.
pub fn percent(loaded: u64, total: Option<u64>) -> Option<u8> {
    let total = u128::from(total.filter(|total| *total > 0)?);
    let loaded = u128::from(loaded);
    let rounded = (loaded * 200 + total) / (total * 2);
    Some(rounded.min(100) as u8)
}

/// Upload and download percentages of one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    upload: u8,
    download: u8,
}

impl ProgressTracker {
    pub fn new(upload: u8, download: u8) -> Self {
        Self {
            upload: upload.min(100),
            download: download.min(100),
        }
    }

    pub fn upload(&self) -> u8 {
        self.upload
    }

    pub fn download(&self) -> u8 {
        self.download
    }

    /// Applies a transport event. Returns `true` when a counter changed;
    /// indeterminate-length events never change anything.
    pub fn record(&mut self, event: &ProgressEvent) -> bool {
        let Some(value) = percent(event.loaded, event.total) else {
            return false;
        };
        let slot = match event.transfer {
            Transfer::Upload => &mut self.upload,
            Transfer::Download => &mut self.download,
        };
        let changed = *slot != value;
        *slot = value;
        changed
    }

    pub fn combined(&self, mode: ProgressMode) -> u8 {
        match mode {
            ProgressMode::Upload => self.upload,
            ProgressMode::Download => self.download,
            ProgressMode::Both => ((u16::from(self.upload) + u16::from(self.download)) / 2) as u8,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
