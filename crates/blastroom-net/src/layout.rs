//! Random obstacle layouts.

use blastroom_types::Grid;
use rand::seq::index;

/// Pick `cells / density_ratio` distinct cell indices, sorted ascending.
///
/// A ratio of zero yields an empty layout.
pub fn sample_layout(grid: &Grid, density_ratio: u32) -> Vec<i64> {
    let total = grid.cell_count();
    let Some(amount) = usize::try_from(density_ratio)
        .ok()
        .and_then(|ratio| total.checked_div(ratio))
    else {
        return Vec::new();
    };

    let mut rng = rand::rng();
    let mut cells: Vec<i64> = index::sample(&mut rng, total, amount)
        .into_iter()
        .filter_map(|i| i64::try_from(i).ok())
        .collect();
    cells.sort_unstable();
    cells
}
