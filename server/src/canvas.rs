use shared::{CellContent, CellPos, Region, SurfaceId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// The physical surface cells are written to.
///
/// Implementations must be safe to call concurrently for different cells.
pub trait Canvas: Send + Sync {
    fn cell(&self, surface: &str, pos: CellPos) -> Option<CellContent>;

    fn set_cell(&self, surface: &str, pos: CellPos, content: CellContent);
}

/// Canvas kept entirely in memory.
///
/// An optional floor reports the same content for every column of a region
/// one layer below it, without storing each cell.
#[derive(Debug, Default)]
pub struct MemoryCanvas {
    cells: RwLock<HashMap<(SurfaceId, CellPos), CellContent>>,
    floor: Option<(Region, CellContent)>,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canvas whose layer directly under `region` reads as `content`.
    pub fn with_floor(region: Region, content: CellContent) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            floor: Some((region, content)),
        }
    }

    /// Number of cells written so far across all surfaces.
    pub fn written(&self) -> usize {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn floor_at(&self, pos: CellPos) -> Option<CellContent> {
        let (region, content) = self.floor.as_ref()?;
        let floor_y = region.min().y.checked_sub(1)?;
        if pos.y == floor_y && region.contains_horizontal(pos.x, pos.z) {
            Some(content.clone())
        } else {
            None
        }
    }
}

impl Canvas for MemoryCanvas {
    fn cell(&self, surface: &str, pos: CellPos) -> Option<CellContent> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells
            .get(&(surface.to_string(), pos))
            .cloned()
            .or_else(|| self.floor_at(pos))
    }

    fn set_cell(&self, surface: &str, pos: CellPos, content: CellContent) {
        self.cells
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((surface.to_string(), pos), content);
    }
}
