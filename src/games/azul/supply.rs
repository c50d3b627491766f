//! Tile supply: the bag, factory fills and recycling spent tiles.

use rand::seq::SliceRandom;
use rand::Rng;

use super::types::{GameState, Tile, TILES_PER_FACTORY};

/// A fresh, shuffled bag of all 100 tiles.
pub fn new_bag<R: Rng + ?Sized>(rng: &mut R) -> Vec<Tile> {
    let mut bag = GameState::empty().tile_bag;
    bag.shuffle(rng);
    bag
}

/// Remove up to `n` tiles uniformly at random without replacement.
/// Returns fewer than `n` when the pool runs dry.
pub fn draw_random<R: Rng + ?Sized>(pool: &mut Vec<Tile>, n: usize, rng: &mut R) -> Vec<Tile> {
    let mut drawn = Vec::with_capacity(n.min(pool.len()));
    for _ in 0..n {
        if pool.is_empty() {
            break;
        }
        let idx = rng.gen_range(0..pool.len());
        drawn.push(pool.swap_remove(idx));
    }
    drawn
}

/// Top every factory up to four tiles from the bag, factory by factory.
///
/// Never recycles: once the bag is dry the remaining factories stay short or empty.
/// Returns the number of tiles dealt.
pub fn fill_factories<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) -> usize {
    let mut dealt = 0;
    for factory in state.factories.iter_mut() {
        let want = TILES_PER_FACTORY.saturating_sub(factory.len());
        let drawn = draw_random(&mut state.tile_bag, want, rng);
        dealt += drawn.len();
        factory.extend(drawn);
    }
    dealt
}

/// If the bag is empty, pour the discard pile into it and shuffle. Returns whether
/// anything moved.
///
/// The pot is never a source: a round only ends once the pot has been emptied.
pub fn recycle_if_empty<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) -> bool {
    if !state.tile_bag.is_empty() || state.discard_pile.is_empty() {
        return false;
    }
    state.tile_bag.append(&mut state.discard_pile);
    state.tile_bag.shuffle(rng);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::azul::types::{TileType, NUM_FACTORIES, TILES_PER_COLOR, TOTAL_TILES};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_new_bag_has_twenty_of_each() {
        let mut rng = StdRng::seed_from_u64(1);
        let bag = new_bag(&mut rng);
        assert_eq!(bag.len(), TOTAL_TILES);
        for color in [TileType::Blue, TileType::White] {
            assert_eq!(bag.iter().filter(|t| t.tile_type == color).count(), TILES_PER_COLOR);
        }
    }

    #[test]
    fn test_draw_random_without_replacement() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut pool = vec![Tile::new(TileType::Red); 3];
        let drawn = draw_random(&mut pool, 5, &mut rng);
        assert_eq!(drawn.len(), 3);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_fill_factories_deals_twenty_tiles() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = GameState::empty();
        let dealt = fill_factories(&mut state, &mut rng);
        assert_eq!(dealt, NUM_FACTORIES * TILES_PER_FACTORY);
        assert!(state.factories.iter().all(|f| f.len() == TILES_PER_FACTORY));
        assert_eq!(state.tile_bag.len(), TOTAL_TILES - dealt);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_fill_factories_short_bag_leaves_factories_short() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut state = GameState::empty();
        // Keep 6 tiles in the bag, park the rest in the discard pile.
        let kept = state.tile_bag.split_off(TOTAL_TILES - 6);
        state.discard_pile = std::mem::replace(&mut state.tile_bag, kept);

        let dealt = fill_factories(&mut state, &mut rng);
        assert_eq!(dealt, 6);
        assert_eq!(state.factories[0].len(), 4);
        assert_eq!(state.factories[1].len(), 2);
        assert!(state.factories[2..].iter().all(Vec::is_empty));
        // No recycling mid-fill.
        assert_eq!(state.discard_pile.len(), TOTAL_TILES - 6);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_recycle_only_when_bag_empty() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = GameState::empty();
        state.discard_pile.push(state.tile_bag.pop().unwrap());
        assert!(!recycle_if_empty(&mut state, &mut rng));

        state.discard_pile.append(&mut state.tile_bag);
        assert!(recycle_if_empty(&mut state, &mut rng));
        assert_eq!(state.tile_bag.len(), TOTAL_TILES);
        assert!(state.discard_pile.is_empty());
    }

    #[test]
    fn test_recycle_leaves_pot_alone() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut state = GameState::empty();
        state.pot.push(state.tile_bag.pop().unwrap());
        state.discard_pile.append(&mut state.tile_bag);
        assert!(recycle_if_empty(&mut state, &mut rng));
        assert_eq!(state.pot.len(), 1);
        assert_eq!(state.tile_bag.len(), TOTAL_TILES - 1);
        assert!(state.check_invariants().is_ok());
    }
}
