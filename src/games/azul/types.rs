//! Azul domain types: tiles, player boards, supply pools and the replicated game state.

use serde::{Deserialize, Serialize};

pub const NUM_PLAYERS: usize = 2;
pub const WALL_SIZE: usize = 5;
pub const NUM_FACTORIES: usize = 5;
pub const TILES_PER_FACTORY: usize = 4;
pub const FLOOR_SIZE: usize = 7;
pub const TILES_PER_COLOR: usize = 20;
pub const TOTAL_TILES: usize = TILES_PER_COLOR * ALL_TILE_TYPES.len();

/// Penalty per occupied floor slot, left to right.
pub const FLOOR_PENALTIES: [i32; FLOOR_SIZE] = [-1, -1, -2, -2, -2, -3, -3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileType {
    Blue,
    Red,
    Black,
    Yellow,
    White,
}

pub const ALL_TILE_TYPES: [TileType; 5] = [
    TileType::Blue,
    TileType::Red,
    TileType::Black,
    TileType::Yellow,
    TileType::White,
];

impl TileType {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column of this color in wall row 0. Each lower row shifts one column right.
    fn pattern_offset(self) -> usize {
        match self {
            TileType::Blue => 0,
            TileType::Yellow => 1,
            TileType::Red => 2,
            TileType::Black => 3,
            TileType::White => 4,
        }
    }
}

use TileType::{Black, Blue, Red, White, Yellow};

/// Fixed color of every wall cell.
pub const WALL_PATTERN: [[TileType; WALL_SIZE]; WALL_SIZE] = [
    [Blue, Yellow, Red, Black, White],
    [White, Blue, Yellow, Red, Black],
    [Black, White, Blue, Yellow, Red],
    [Red, Black, White, Blue, Yellow],
    [Yellow, Red, Black, White, Blue],
];

/// Wall column that `color` occupies in `row`.
#[inline]
pub fn wall_column(row: usize, color: TileType) -> usize {
    (color.pattern_offset() + row) % WALL_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    #[serde(rename = "type")]
    pub tile_type: TileType,
}

impl Tile {
    pub const fn new(tile_type: TileType) -> Self {
        Self { tile_type }
    }
}

pub type Wall = [[Option<Tile>; WALL_SIZE]; WALL_SIZE];
pub type Floor = [Option<Tile>; FLOOR_SIZE];

/// Draft buffer for the tiles taken this turn.
///
/// Colors may be mixed. Placing a tile empties its slot so slot indices stay
/// stable for the whole turn; undo puts tiles back into the exact slot they left.
/// `locked_color` is set by the first placement and pins the turn to that color.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingArea {
    pub slots: Vec<Option<Tile>>,
    #[serde(default)]
    pub locked_color: Option<TileType>,
}

impl HoldingArea {
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.tiles().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn count_of(&self, color: TileType) -> usize {
        self.tiles().filter(|t| t.tile_type == color).count()
    }

    pub fn first_slot_of(&self, color: TileType) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(t) if t.tile_type == color))
    }

    /// Distinct colors present, in first-seen order.
    pub fn colors(&self) -> Vec<TileType> {
        let mut colors = Vec::new();
        for tile in self.tiles() {
            if !colors.contains(&tile.tile_type) {
                colors.push(tile.tile_type);
            }
        }
        colors
    }

    pub fn push_all(&mut self, tiles: impl IntoIterator<Item = Tile>) {
        self.slots.extend(tiles.into_iter().map(Some));
    }

    pub fn take(&mut self, slot: usize) -> Option<Tile> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub fn restore(&mut self, slot: usize, tile: Tile) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(tile);
    }

    /// Empty the buffer, returning remaining tiles in slot order.
    pub fn drain(&mut self) -> Vec<Tile> {
        self.locked_color = None;
        self.slots.drain(..).flatten().collect()
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.locked_color.is_some() && self.slots.is_empty() {
            return Err("holding area is color-locked but holds no slots".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBoard {
    pub wall: Wall,
    /// Row i has i+1 slots and fills right to left.
    pub staircase: Vec<Vec<Option<Tile>>>,
    pub floor: Floor,
    pub holding_area: HoldingArea,
    pub score: u32,
}

impl Default for PlayerBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerBoard {
    pub fn new() -> Self {
        Self {
            wall: [[None; WALL_SIZE]; WALL_SIZE],
            staircase: (0..WALL_SIZE).map(|i| vec![None; i + 1]).collect(),
            floor: [None; FLOOR_SIZE],
            holding_area: HoldingArea::default(),
            score: 0,
        }
    }

    pub fn wall_row_has(&self, row: usize, color: TileType) -> bool {
        self.wall[row][wall_column(row, color)].is_some()
    }

    pub fn staircase_row_color(&self, row: usize) -> Option<TileType> {
        self.staircase[row].iter().flatten().map(|t| t.tile_type).next()
    }

    pub fn staircase_row_full(&self, row: usize) -> bool {
        self.staircase[row].iter().all(Option::is_some)
    }

    pub fn rightmost_empty_staircase_slot(&self, row: usize) -> Option<usize> {
        self.staircase[row].iter().rposition(Option::is_none)
    }

    pub fn first_empty_floor_slot(&self) -> Option<usize> {
        self.floor.iter().position(Option::is_none)
    }

    /// Whether a tile of `color` may go into staircase row `row` right now.
    pub fn row_accepts(&self, row: usize, color: TileType) -> bool {
        row < WALL_SIZE
            && !self.wall_row_has(row, color)
            && self.staircase_row_color(row).map_or(true, |c| c == color)
            && !self.staircase_row_full(row)
    }

    /// Whether a tile of `color` has any legal destination (a row or the floor).
    pub fn can_place(&self, color: TileType) -> bool {
        self.first_empty_floor_slot().is_some()
            || (0..WALL_SIZE).any(|row| self.row_accepts(row, color))
    }

    pub fn has_complete_wall_row(&self) -> bool {
        self.wall.iter().any(|row| row.iter().all(Option::is_some))
    }

    fn add_counts(&self, counts: &mut [usize; 5]) {
        let tiles = self
            .wall
            .iter()
            .flatten()
            .chain(self.staircase.iter().flatten())
            .chain(self.floor.iter())
            .flatten()
            .copied()
            .chain(self.holding_area.tiles());
        for tile in tiles {
            counts[tile.tile_type.index()] += 1;
        }
    }
}

/// Where the tiles in the holding area came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "index", rename_all = "snake_case")]
pub enum TileSource {
    Factory(usize),
    Pot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "location", content = "row_index", rename_all = "snake_case")]
pub enum PlacementDestination {
    Staircase(usize),
    Floor,
}

/// One placement of the current turn, kept for undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedTile {
    #[serde(rename = "type")]
    pub tile_type: TileType,
    pub destination: PlacementDestination,
    /// Staircase or floor slot written.
    pub slot: usize,
    /// Holding-area slot the tile came from.
    pub holding_slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Playing,
    ReadyToWallTile,
    DoneWallTiling,
    GameOver,
}

/// Full replicated game state. Each client holds one complete copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub players: [PlayerBoard; NUM_PLAYERS],
    pub current_player: usize,
    pub tile_bag: Vec<Tile>,
    pub factories: [Vec<Tile>; NUM_FACTORIES],
    pub pot: Vec<Tile>,
    pub discard_pile: Vec<Tile>,
    pub selected_color: Option<TileType>,
    pub has_placed_tile: bool,
    pub current_tile_source: Option<TileSource>,
    pub placed_tiles_this_turn: Vec<PlacedTile>,
    pub first_player_marker_index: usize,
    pub has_first_player_been_moved: bool,
    /// Marker holder before this turn's pot draw claimed it.
    #[serde(default)]
    pub marker_before_draw: Option<usize>,
    pub phase: GamePhase,
    #[serde(default = "first_round")]
    pub round: u32,
}

fn first_round() -> u32 {
    1
}

impl GameState {
    /// Empty table with every tile still in `tile_bag` (unshuffled).
    pub fn empty() -> Self {
        let tile_bag = ALL_TILE_TYPES
            .iter()
            .flat_map(|&t| std::iter::repeat(Tile::new(t)).take(TILES_PER_COLOR))
            .collect();
        Self {
            players: [PlayerBoard::new(), PlayerBoard::new()],
            current_player: 0,
            tile_bag,
            factories: std::array::from_fn(|_| Vec::new()),
            pot: Vec::new(),
            discard_pile: Vec::new(),
            selected_color: None,
            has_placed_tile: false,
            current_tile_source: None,
            placed_tiles_this_turn: Vec::new(),
            first_player_marker_index: 0,
            has_first_player_been_moved: false,
            marker_before_draw: None,
            phase: GamePhase::Playing,
            round: 1,
        }
    }

    pub fn all_sources_empty(&self) -> bool {
        self.pot.is_empty() && self.factories.iter().all(Vec::is_empty)
    }

    /// Count of each color across every zone, indexed by `TileType::index`.
    pub fn tile_counts(&self) -> [usize; 5] {
        let mut counts = [0usize; 5];
        let pools = self
            .tile_bag
            .iter()
            .chain(self.discard_pile.iter())
            .chain(self.pot.iter())
            .chain(self.factories.iter().flatten());
        for tile in pools {
            counts[tile.tile_type.index()] += 1;
        }
        for board in &self.players {
            board.add_counts(&mut counts);
        }
        counts
    }

    /// Verify conservation and board invariants.
    pub fn check_invariants(&self) -> Result<(), String> {
        let counts = self.tile_counts();
        for color in ALL_TILE_TYPES {
            let n = counts[color.index()];
            if n != TILES_PER_COLOR {
                return Err(format!(
                    "tile conservation violated for {color:?}: expected {TILES_PER_COLOR}, got {n}"
                ));
            }
        }

        for (p, board) in self.players.iter().enumerate() {
            board.holding_area.check_invariants()?;
            for row in 0..WALL_SIZE {
                for col in 0..WALL_SIZE {
                    if let Some(tile) = board.wall[row][col] {
                        if tile.tile_type != WALL_PATTERN[row][col] {
                            return Err(format!(
                                "player {p} wall ({row},{col}) holds {:?}, pattern requires {:?}",
                                tile.tile_type, WALL_PATTERN[row][col]
                            ));
                        }
                    }
                }
                let mut colors = board.staircase[row].iter().flatten().map(|t| t.tile_type);
                if let Some(first) = colors.next() {
                    if colors.any(|c| c != first) {
                        return Err(format!("player {p} staircase row {row} mixes colors"));
                    }
                    if board.wall_row_has(row, first) {
                        return Err(format!(
                            "player {p} staircase row {row} holds {first:?} already on the wall"
                        ));
                    }
                }
            }
        }

        let locked = self.players[self.current_player].holding_area.locked_color;
        match (locked, self.placed_tiles_this_turn.first()) {
            (None, None) => {}
            (Some(color), Some(_)) => {
                if self.placed_tiles_this_turn.iter().any(|p| p.tile_type != color) {
                    return Err("placements this turn disagree with the locked color".into());
                }
            }
            (None, Some(_)) => return Err("placements recorded without a color lock".into()),
            (Some(_), None) => return Err("color locked without any placement".into()),
        }
        Ok(())
    }
}
