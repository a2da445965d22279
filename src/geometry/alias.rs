//! Alias tables for constant-time discrete sampling.

use bytemuck::{Pod, Zeroable};

/// One bucket: keep the bucket with probability `prob`, else jump to `alias`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct AliasEntry {
    pub prob: f32,
    pub alias: u32,
}

/// Build an alias table and the normalized pdf for `weights` (Vose).
///
/// Negative and non-finite weights count as zero. If nothing has positive
/// weight the distribution is uniform.
pub fn create_alias_table(weights: &[f32]) -> (Vec<AliasEntry>, Vec<f32>) {
    let n = weights.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let clean = |w: f32| if w.is_finite() && w > 0.0 { w as f64 } else { 0.0 };
    let sum: f64 = weights.iter().map(|&w| clean(w)).sum();
    let pdf: Vec<f64> = if sum > 0.0 {
        weights.iter().map(|&w| clean(w) / sum).collect()
    } else {
        vec![1.0 / n as f64; n]
    };

    let mut scaled: Vec<f64> = pdf.iter().map(|p| p * n as f64).collect();
    let mut table = vec![AliasEntry::default(); n];
    let (mut small, mut large): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| scaled[i] < 1.0);

    loop {
        let (Some(&s), Some(&l)) = (small.last(), large.last()) else {
            break;
        };
        small.pop();
        table[s] = AliasEntry {
            prob: scaled[s] as f32,
            alias: l as u32,
        };
        scaled[l] -= 1.0 - scaled[s];
        if scaled[l] < 1.0 {
            large.pop();
            small.push(l);
        }
    }
    // Leftovers are 1 up to rounding.
    for i in large.into_iter().chain(small) {
        table[i] = AliasEntry {
            prob: 1.0,
            alias: i as u32,
        };
    }

    (table, pdf.into_iter().map(|p| p as f32).collect())
}

/// Sample `table` with `u` in `[0, 1)`.
pub fn sample_alias_table(table: &[AliasEntry], u: f32) -> usize {
    let n = table.len();
    let scaled = u.clamp(0.0, 1.0) * n as f32;
    let i = (scaled as usize).min(n.saturating_sub(1));
    let remapped = scaled - i as f32;
    if remapped < table[i].prob {
        i
    } else {
        table[i].alias as usize
    }
}
