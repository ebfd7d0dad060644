use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerKind {
    Start,
    Stop,
}

/// Detector that produced a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerSource {
    Assumed,
    Black,
    Logo,
    HBorder,
    VBorder,
    Aspect,
    Channel,
    Overlap,
}

impl MarkerSource {
    pub const ALL: [MarkerSource; 8] = [
        MarkerSource::Assumed,
        MarkerSource::Black,
        MarkerSource::Logo,
        MarkerSource::HBorder,
        MarkerSource::VBorder,
        MarkerSource::Aspect,
        MarkerSource::Channel,
        MarkerSource::Overlap,
    ];

    fn index(self) -> u32 {
        match self {
            MarkerSource::Assumed => 0,
            MarkerSource::Black => 1,
            MarkerSource::Logo => 2,
            MarkerSource::HBorder => 3,
            MarkerSource::VBorder => 4,
            MarkerSource::Aspect => 5,
            MarkerSource::Channel => 6,
            MarkerSource::Overlap => 7,
        }
    }

    /// Sources whose positions are unambiguous picture properties rather than
    /// heuristics.
    pub fn is_strong(self) -> bool {
        matches!(
            self,
            MarkerSource::Aspect
                | MarkerSource::Channel
                | MarkerSource::HBorder
                | MarkerSource::VBorder
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarkerSource::Assumed => "assumed",
            MarkerSource::Black => "black",
            MarkerSource::Logo => "logo",
            MarkerSource::HBorder => "hborder",
            MarkerSource::VBorder => "vborder",
            MarkerSource::Aspect => "aspect",
            MarkerSource::Channel => "channel",
            MarkerSource::Overlap => "overlap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerType {
    pub kind: MarkerKind,
    pub source: MarkerSource,
}

impl MarkerType {
    pub const fn start(source: MarkerSource) -> Self {
        Self {
            kind: MarkerKind::Start,
            source,
        }
    }

    pub const fn stop(source: MarkerSource) -> Self {
        Self {
            kind: MarkerKind::Stop,
            source,
        }
    }

    pub fn is_start(&self) -> bool {
        self.kind == MarkerKind::Start
    }

    pub fn with_source(self, source: MarkerSource) -> Self {
        Self { source, ..self }
    }

    fn bit(&self) -> u16 {
        let kind = match self.kind {
            MarkerKind::Start => 0,
            MarkerKind::Stop => 1,
        };
        1 << (self.source.index() * 2 + kind)
    }
}

impl fmt::Display for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MarkerKind::Start => "start",
            MarkerKind::Stop => "stop",
        };
        write!(f, "{} {}", self.source.as_str(), kind)
    }
}

/// Set of marker types used to filter `prev`/`next` lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeMask(u16);

impl TypeMask {
    pub const NONE: TypeMask = TypeMask(0);
    pub const ALL: TypeMask = TypeMask(u16::MAX);

    pub fn of(marker_type: MarkerType) -> Self {
        Self(marker_type.bit())
    }

    pub fn starts() -> Self {
        MarkerSource::ALL
            .iter()
            .fold(Self::NONE, |mask, source| mask | Self::of(MarkerType::start(*source)))
    }

    pub fn stops() -> Self {
        MarkerSource::ALL
            .iter()
            .fold(Self::NONE, |mask, source| mask | Self::of(MarkerType::stop(*source)))
    }

    pub fn contains(&self, marker_type: MarkerType) -> bool {
        self.0 & marker_type.bit() != 0
    }
}

impl BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        TypeMask(self.0 | rhs.0)
    }
}

impl From<MarkerType> for TypeMask {
    fn from(marker_type: MarkerType) -> Self {
        Self::of(marker_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub marker_type: MarkerType,
    pub position: u64,
    pub comment: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkError {
    #[error("no marker at frame {position}")]
    NotFound { position: u64 },
}

/// Ordered collection of cut markers keyed by frame number.
pub trait MarkerStore {
    /// Adds a marker. A marker already at `position` keeps its type and gains
    /// the comment.
    fn add(&mut self, marker_type: MarkerType, position: u64, comment: Option<String>);

    /// Relocates the marker at `position`. Moving onto an occupied position
    /// merges into the marker found there.
    fn move_marker(
        &mut self,
        position: u64,
        new_position: u64,
        new_type: MarkerType,
    ) -> Result<(), MarkError>;

    /// Closest marker strictly before `position` whose type is in `mask`.
    fn prev(&self, position: u64, mask: TypeMask) -> Option<&Marker>;

    /// Closest marker strictly after `position` whose type is in `mask`.
    fn next(&self, position: u64, mask: TypeMask) -> Option<&Marker>;

    fn get(&self, position: u64) -> Option<&Marker>;

    fn iter(&self) -> Box<dyn Iterator<Item = &Marker> + '_>;
}

#[derive(Debug, Clone, Default)]
pub struct MarkList {
    marks: BTreeMap<u64, Marker>,
}

impl MarkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    fn insert_or_merge(&mut self, marker: Marker) {
        match self.marks.get_mut(&marker.position) {
            Some(existing) => {
                existing.comment = merge_comments(existing.comment.take(), marker.comment);
            }
            None => {
                self.marks.insert(marker.position, marker);
            }
        }
    }
}

fn merge_comments(current: Option<String>, incoming: Option<String>) -> Option<String> {
    match (current, incoming) {
        (Some(current), Some(incoming)) if current != incoming => {
            Some(format!("{current}; {incoming}"))
        }
        (Some(current), _) => Some(current),
        (None, incoming) => incoming,
    }
}

impl MarkerStore for MarkList {
    fn add(&mut self, marker_type: MarkerType, position: u64, comment: Option<String>) {
        self.insert_or_merge(Marker {
            marker_type,
            position,
            comment,
        });
    }

    fn move_marker(
        &mut self,
        position: u64,
        new_position: u64,
        new_type: MarkerType,
    ) -> Result<(), MarkError> {
        let mut marker = self
            .marks
            .remove(&position)
            .ok_or(MarkError::NotFound { position })?;
        marker.position = new_position;
        marker.marker_type = new_type;
        self.insert_or_merge(marker);
        Ok(())
    }

    fn prev(&self, position: u64, mask: TypeMask) -> Option<&Marker> {
        self.marks
            .range(..position)
            .rev()
            .map(|(_, marker)| marker)
            .find(|marker| mask.contains(marker.marker_type))
    }

    fn next(&self, position: u64, mask: TypeMask) -> Option<&Marker> {
        self.marks
            .range(position.saturating_add(1)..)
            .map(|(_, marker)| marker)
            .find(|marker| mask.contains(marker.marker_type))
    }

    fn get(&self, position: u64) -> Option<&Marker> {
        self.marks.get(&position)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &Marker> + '_> {
        Box::new(self.marks.values())
    }
}
