use serde::{Deserialize, Serialize};

/// Lowest corner of the default canvas volume (inclusive).
pub const CANVAS_MIN: CellPos = CellPos::new(-512, 2, -512);
/// Highest corner of the default canvas volume (inclusive).
pub const CANVAS_MAX: CellPos = CellPos::new(512, 2, 512);

/// Cooldown between two commits by the same user, used when the document has no setting.
pub const DEFAULT_WAIT_SECONDS: u64 = 30;
/// Idle window after which a resident stats view is dropped.
pub const DEFAULT_IDLE_MINUTES: u64 = 5;
/// Interval of the periodic flush and cleanup task.
pub const DEFAULT_FLUSH_MINUTES: u64 = 5;

pub type SurfaceId = String;
pub type UserId = String;

/// Integer coordinate of a single cell.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The neighbouring cell on the given side.
    pub fn offset(self, facing: Facing) -> Self {
        let (dx, dy, dz) = facing.delta();
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            z: self.z.saturating_add(dz),
        }
    }
}

/// Side of a cell the actor is facing when interacting with it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Up,
    Down,
    North,
    South,
    East,
    West,
}

impl Facing {
    pub fn delta(self) -> (i32, i32, i32) {
        match self {
            Facing::Up => (0, 1, 0),
            Facing::Down => (0, -1, 0),
            Facing::North => (0, 0, -1),
            Facing::South => (0, 0, 1),
            Facing::East => (1, 0, 0),
            Facing::West => (-1, 0, 0),
        }
    }
}

/// Axis-aligned box of cells, inclusive on every axis.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    min: CellPos,
    max: CellPos,
}

impl Region {
    /// Builds a region from two opposite corners in any order.
    pub fn new(a: CellPos, b: CellPos) -> Self {
        Self {
            min: CellPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: CellPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn min(&self) -> CellPos {
        self.min
    }

    pub fn max(&self) -> CellPos {
        self.max
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        self.contains_horizontal(pos.x, pos.z) && pos.y >= self.min.y && pos.y <= self.max.y
    }

    /// Same test ignoring height, for callers that derive the layer themselves.
    pub fn contains_horizontal(&self, x: i32, z: i32) -> bool {
        x >= self.min.x && x <= self.max.x && z >= self.min.z && z <= self.max.z
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::new(CANVAS_MIN, CANVAS_MAX)
    }
}

/// Opaque content of a cell. The engine never looks inside.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct CellContent(pub String);

impl CellContent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }
}

/// Per-(user, surface) counters.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    /// Epoch millis of the last committed action, 0 if none.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub placements: u32,
    #[serde(default)]
    pub replacements: u32,
}

impl SurfaceStats {
    pub fn total_actions(&self) -> u64 {
        u64::from(self.placements) + u64::from(self.replacements)
    }
}

/// What the acting user should be told after an interaction.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Feedback {
    Placed {
        pos: CellPos,
        overwrote: bool,
    },
    Replaced {
        pos: CellPos,
        overwrote: bool,
    },
    Wait {
        seconds: u64,
    },
    NotAllowed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Probe {
        surface: SurfaceId,
        pos: CellPos,
    },
    Commit {
        surface: SurfaceId,
        user: UserId,
        pos: CellPos,
        facing: Facing,
        held: Option<CellContent>,
    },
    NativePlace {
        surface: SurfaceId,
        user: UserId,
    },
    ActivateSurface {
        surface: SurfaceId,
    },
    StatsQuery {
        surface: SurfaceId,
        user: UserId,
    },

    Verdict {
        suppress: bool,
        feedback: Option<Feedback>,
    },
    Stats {
        surface: SurfaceId,
        user: UserId,
        stats: SurfaceStats,
    },
}
