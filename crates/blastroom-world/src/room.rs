//! The shared room state.
//!
//! Players and bombs are each indexed twice, by name and by cell. The bomb
//! indexes are always updated together so a bomb is in both or in neither.
//! The player cell index is pruned on every move, and occupancy checks
//! still revalidate against the player's own position before acting.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use blastroom_types::{Grid, Position};

use crate::entities::{BombState, PlayerState};

/// Everything peers in a room agree on.
#[derive(Debug)]
pub struct Room {
    pub(crate) grid: Grid,
    pub(crate) blast_length: u32,
    pub(crate) players: BTreeMap<String, PlayerState>,
    pub(crate) players_at: BTreeMap<Position, BTreeSet<String>>,
    pub(crate) bombs: BTreeMap<String, BombState>,
    pub(crate) bombs_at: BTreeMap<Position, String>,
    pub(crate) blast: BTreeMap<Position, u32>,
    /// Cells covered by each explosion still burning, oldest first, keyed by
    /// origin. `UndoExplode` retires exactly the cells its explosion covered.
    pub(crate) burning: BTreeMap<Position, VecDeque<Vec<Position>>>,
    pub(crate) obstacles: BTreeSet<Position>,
}

/// Counts for a one-line log of the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSummary {
    /// Players known to the room.
    pub players: usize,
    /// Players currently alive.
    pub alive: usize,
    /// Bombs waiting to explode.
    pub bombs: usize,
    /// Cells with a positive blast counter.
    pub lethal_cells: usize,
    /// Obstacle cells in the current layout.
    pub obstacles: usize,
}

impl Room {
    /// Create an empty room.
    pub const fn new(grid: Grid, blast_length: u32) -> Self {
        Self {
            grid,
            blast_length,
            players: BTreeMap::new(),
            players_at: BTreeMap::new(),
            bombs: BTreeMap::new(),
            bombs_at: BTreeMap::new(),
            blast: BTreeMap::new(),
            burning: BTreeMap::new(),
            obstacles: BTreeSet::new(),
        }
    }

    /// Arena dimensions.
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Cells reached along each axis by an explosion.
    pub const fn blast_length(&self) -> u32 {
        self.blast_length
    }

    /// Look up a player by identity.
    pub fn player(&self, name: &str) -> Option<&PlayerState> {
        self.players.get(name)
    }

    /// All players, ordered by name.
    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    /// Living players standing on `pos`.
    pub fn players_at(&self, pos: Position) -> impl Iterator<Item = &PlayerState> {
        self.players_at
            .get(&pos)
            .into_iter()
            .flatten()
            .filter_map(|name| self.players.get(name))
            .filter(move |p| p.alive && p.position == pos)
    }

    /// Look up a bomb by name.
    pub fn bomb(&self, name: &str) -> Option<&BombState> {
        self.bombs.get(name)
    }

    /// The bomb on `pos`, if any.
    pub fn bomb_at(&self, pos: Position) -> Option<&BombState> {
        self.bombs_at.get(&pos).and_then(|name| self.bombs.get(name))
    }

    /// All bombs, ordered by name.
    pub fn bombs(&self) -> impl Iterator<Item = &BombState> {
        self.bombs.values()
    }

    /// Blast counter at `pos`; zero for cells no explosion has touched.
    pub fn blast_level(&self, pos: Position) -> u32 {
        self.blast.get(&pos).copied().unwrap_or(0)
    }

    /// Cells whose blast counter is positive.
    pub fn flames(&self) -> impl Iterator<Item = Position> + '_ {
        self.blast
            .iter()
            .filter(|&(_, level)| *level > 0)
            .map(|(pos, _)| *pos)
    }

    /// Every cell any explosion has touched, with its counter.
    pub fn blast_cells(&self) -> impl Iterator<Item = (Position, u32)> + '_ {
        self.blast.iter().map(|(pos, level)| (*pos, *level))
    }

    /// The current obstacle layout.
    pub const fn obstacles(&self) -> &BTreeSet<Position> {
        &self.obstacles
    }

    /// Whether `pos` holds an obstacle.
    pub fn is_obstacle(&self, pos: Position) -> bool {
        self.obstacles.contains(&pos)
    }

    /// Counts for logging.
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            players: self.players.len(),
            alive: self.players.values().filter(|p| p.alive).count(),
            bombs: self.bombs.len(),
            lethal_cells: self.flames().count(),
            obstacles: self.obstacles.len(),
        }
    }

    /// Insert or overwrite a player, keeping the cell index exact.
    pub(crate) fn upsert_player(&mut self, player: PlayerState) {
        if let Some(previous) = self.players.get(&player.name) {
            let old = previous.position;
            self.unindex_player(&player.name, old);
        }
        self.players_at
            .entry(player.position)
            .or_default()
            .insert(player.name.clone());
        self.players.insert(player.name.clone(), player);
    }

    fn unindex_player(&mut self, name: &str, pos: Position) {
        if let Some(names) = self.players_at.get_mut(&pos) {
            names.remove(name);
            if names.is_empty() {
                self.players_at.remove(&pos);
            }
        }
    }

    /// Remove a bomb from both indexes at once.
    pub(crate) fn remove_bomb_at(&mut self, pos: Position) -> Option<BombState> {
        let name = self.bombs_at.remove(&pos)?;
        self.bombs.remove(&name)
    }

    /// Whether the bomb called `name` is consistently indexed.
    pub(crate) fn bomb_is_indexed(&self, name: &str) -> bool {
        self.bombs
            .get(name)
            .is_some_and(|bomb| self.bombs_at.get(&bomb.position).is_some_and(|n| n == name))
    }
}
