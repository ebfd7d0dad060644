use markcut_types::{Picture, Plane};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    /// Consecutive frames needed to confirm a border change.
    pub min_frames: u32,
    /// Mean luma at or below which a band counts as black.
    pub dark_threshold: u8,
    /// Band depth in percent of the picture height (width for pillars).
    pub depth_percent: u32,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            min_frames: 5,
            dark_threshold: 20,
            depth_percent: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderKind {
    /// Bars above and below the picture.
    Horizontal,
    /// Bars left and right of the picture.
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderEvent {
    Started { kind: BorderKind, first_frame: u64 },
    Ended { kind: BorderKind, last_frame: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Run {
    kind: Option<BorderKind>,
    start: u64,
    count: u32,
}

/// Tracks letterbox and pillarbox bars frame by frame.
#[derive(Debug, Clone)]
pub struct BorderDetector {
    config: BorderConfig,
    active: Option<BorderKind>,
    run: Option<Run>,
}

impl BorderDetector {
    pub fn new(config: BorderConfig) -> Self {
        Self {
            config,
            active: None,
            run: None,
        }
    }

    pub fn active(&self) -> Option<BorderKind> {
        self.active
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Border kind shown by a single picture.
    pub fn classify(&self, picture: &Picture) -> Option<BorderKind> {
        let luma = picture.luma();
        let (width, height) = (luma.width(), luma.height());
        if width < 3 || height < 3 {
            return None;
        }
        let threshold = self.config.dark_threshold as u64;
        let depth_rows = (height * self.config.depth_percent / 100).max(1);
        let depth_columns = (width * self.config.depth_percent / 100).max(1);
        let centre = band_mean(luma, width / 3, height / 3, width / 3, height / 3);
        if centre <= threshold {
            return None;
        }

        let top = band_mean(luma, 0, 0, width, depth_rows);
        let bottom = band_mean(luma, 0, height - depth_rows, width, depth_rows);
        if top <= threshold && bottom <= threshold {
            return Some(BorderKind::Horizontal);
        }
        let left = band_mean(luma, 0, 0, depth_columns, height);
        let right = band_mean(luma, width - depth_columns, 0, depth_columns, height);
        if left <= threshold && right <= threshold {
            return Some(BorderKind::Vertical);
        }
        None
    }

    /// Feeds one picture. Border changes are confirmed after `min_frames`
    /// consecutive pictures and reported with the first (last) bordered frame.
    pub fn observe(&mut self, picture: &Picture) -> Option<BorderEvent> {
        let kind = self.classify(picture);
        let frame = picture.frame_number();
        if kind == self.active {
            self.run = None;
            return None;
        }
        let run = match self.run {
            Some(run) if run.kind == kind => Run {
                count: run.count + 1,
                ..run
            },
            _ => Run {
                kind,
                start: frame,
                count: 1,
            },
        };
        if run.count < self.config.min_frames.max(1) {
            self.run = Some(run);
            return None;
        }

        self.run = None;
        let previous = std::mem::replace(&mut self.active, kind);
        debug!(frame, ?previous, current = ?kind, "border change confirmed");
        match (previous, kind) {
            (Some(old), _) if kind.is_none() => Some(BorderEvent::Ended {
                kind: old,
                last_frame: run.start.saturating_sub(1),
            }),
            (_, Some(new)) => Some(BorderEvent::Started {
                kind: new,
                first_frame: run.start,
            }),
            _ => None,
        }
    }
}

fn band_mean(plane: &Plane, x: u32, y: u32, width: u32, height: u32) -> u64 {
    let mut sum = 0u64;
    for row in y..y + height {
        let line = plane.row(row);
        sum += line[x as usize..(x + width) as usize]
            .iter()
            .map(|&v| v as u64)
            .sum::<u64>();
    }
    let count = width as u64 * height as u64;
    if count == 0 { 0 } else { sum / count }
}
