//! Channel remix matrix construction — §4.3 "Channel remix algorithm".

use crate::channel::{ChannelMap, ChannelPosition};

bitflags::bitflags! {
    /// Resampler construction flags affecting remix/rate behaviour.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResampleFlags: u32 {
        /// Map input to output by channel index, ignoring position.
        const NO_REMAP = 1 << 0;
        /// Map input to output by exact position match only; no blending.
        const NO_REMIX = 1 << 1;
        /// Permit `set_input_rate`/`set_output_rate` after construction.
        const VARIABLE_RATE = 1 << 2;
    }
}

/// `map_table[out_ch][in_ch]`, a weight applied when summing input channel
/// `in_ch` into output channel `out_ch`.
pub type MapTable = Vec<Vec<f32>>;

/// Build the remix matrix for `in_map -> out_map` under `flags`.
pub fn build_map_table(in_map: &ChannelMap, out_map: &ChannelMap, flags: ResampleFlags) -> MapTable {
    let n_in = in_map.len();
    let n_out = out_map.len();

    if flags.contains(ResampleFlags::NO_REMAP) {
        let mut table = vec![vec![0.0f32; n_in]; n_out];
        for i in 0..n_in.min(n_out) {
            table[i][i] = 1.0;
        }
        return table;
    }

    if flags.contains(ResampleFlags::NO_REMIX) {
        let mut table = vec![vec![0.0f32; n_in]; n_out];
        for (o, &op) in out_map.as_slice().iter().enumerate() {
            for (i, &ip) in in_map.as_slice().iter().enumerate() {
                if positions_match(op, ip) {
                    table[o][i] = 1.0;
                }
            }
        }
        return table;
    }

    full_remix(in_map, out_map)
}

fn positions_match(a: ChannelPosition, b: ChannelPosition) -> bool {
    a == b || matches!(a, ChannelPosition::Mono) || matches!(b, ChannelPosition::Mono)
}

/// The eight-step algorithm. Each step only touches channels left
/// unconnected by earlier steps, so later steps never override an exact
/// identity match.
fn full_remix(in_map: &ChannelMap, out_map: &ChannelMap) -> MapTable {
    let n_in = in_map.len();
    let n_out = out_map.len();
    let in_pos = in_map.as_slice();
    let out_pos = out_map.as_slice();

    let mut table = vec![vec![0.0f32; n_in]; n_out];
    let mut ic_connected = vec![false; n_in];
    let mut oc_connected = vec![false; n_out];

    // Step 1: identity pass.
    for o in 0..n_out {
        for i in 0..n_in {
            if positions_match(out_pos[o], in_pos[i]) {
                table[o][i] = 1.0;
                ic_connected[i] = true;
                oc_connected[o] = true;
            }
        }
    }

    // Step 2/3: unconnected left/right outputs average all left/right inputs.
    average_side(&mut table, &mut oc_connected, out_pos, in_pos, ChannelPosition::is_left);
    average_side(&mut table, &mut oc_connected, out_pos, in_pos, ChannelPosition::is_right);

    // Step 4: unconnected center outputs average center inputs, or L+R
    // when there are no center inputs at all.
    for o in 0..n_out {
        if oc_connected[o] || !out_pos[o].is_center() {
            continue;
        }
        let centers: Vec<usize> = (0..n_in).filter(|&i| in_pos[i].is_center()).collect();
        if !centers.is_empty() {
            let w = 1.0 / centers.len() as f32;
            for i in centers {
                table[o][i] = w;
            }
        } else {
            let sides: Vec<usize> = (0..n_in).filter(|&i| in_pos[i].is_left() || in_pos[i].is_right()).collect();
            if !sides.is_empty() {
                let w = 1.0 / sides.len() as f32;
                for i in sides {
                    table[o][i] = w;
                }
            }
        }
        oc_connected[o] = true;
    }

    // Step 5: unconnected LFE outputs average *all* inputs; does not mark
    // any input as connected.
    for o in 0..n_out {
        if oc_connected[o] || !out_pos[o].is_lfe() {
            continue;
        }
        if n_in > 0 {
            let w = 1.0 / n_in as f32;
            for i in 0..n_in {
                table[o][i] += w;
            }
        }
        oc_connected[o] = true;
    }

    // Step 6: unconnected input left/right channels fold into the
    // already-connected rows on the same side.
    fold_unconnected_side(&mut table, &ic_connected, out_pos, in_pos, ChannelPosition::is_left);
    fold_unconnected_side(&mut table, &ic_connected, out_pos, in_pos, ChannelPosition::is_right);

    // Step 7: unconnected input center channels fold into center outputs,
    // or L+R when there are no center outputs.
    {
        let unconnected: Vec<usize> = (0..n_in).filter(|&i| !ic_connected[i] && in_pos[i].is_center()).collect();
        if !unconnected.is_empty() {
            let n = unconnected.len() as f32;
            let centers: Vec<usize> = (0..n_out).filter(|&o| out_pos[o].is_center()).collect();
            if !centers.is_empty() {
                for &o in &centers {
                    for col in table[o].iter_mut() {
                        *col *= 0.9;
                    }
                    for &i in &unconnected {
                        table[o][i] += 0.1 / n;
                    }
                }
            } else {
                let sides: Vec<usize> =
                    (0..n_out).filter(|&o| out_pos[o].is_left() || out_pos[o].is_right()).collect();
                for &o in &sides {
                    for col in table[o].iter_mut() {
                        *col *= 0.75;
                    }
                    for &i in &unconnected {
                        table[o][i] += 0.375 / n;
                    }
                }
            }
        }
    }

    // Step 8: unconnected input LFE mixes into all outputs uniformly, no
    // pre-scale of existing weights.
    {
        let unconnected: Vec<usize> = (0..n_in).filter(|&i| !ic_connected[i] && in_pos[i].is_lfe()).collect();
        if !unconnected.is_empty() && n_out > 0 {
            let n = unconnected.len() as f32;
            for o in 0..n_out {
                for &i in &unconnected {
                    table[o][i] += 0.375 / n;
                }
            }
        }
    }

    table
}

fn average_side(
    table: &mut MapTable,
    oc_connected: &mut [bool],
    out_pos: &[ChannelPosition],
    in_pos: &[ChannelPosition],
    side: fn(ChannelPosition) -> bool,
) {
    let inputs: Vec<usize> = (0..in_pos.len()).filter(|&i| side(in_pos[i])).collect();
    if inputs.is_empty() {
        return;
    }
    let w = 1.0 / inputs.len() as f32;
    for o in 0..out_pos.len() {
        if oc_connected[o] || !side(out_pos[o]) {
            continue;
        }
        for &i in &inputs {
            table[o][i] = w;
        }
        oc_connected[o] = true;
    }
}

fn fold_unconnected_side(
    table: &mut MapTable,
    ic_connected: &[bool],
    out_pos: &[ChannelPosition],
    in_pos: &[ChannelPosition],
    side: fn(ChannelPosition) -> bool,
) {
    let unconnected: Vec<usize> = (0..in_pos.len()).filter(|&i| !ic_connected[i] && side(in_pos[i])).collect();
    if unconnected.is_empty() {
        return;
    }
    let n = unconnected.len() as f32;
    let targets: Vec<usize> = (0..out_pos.len()).filter(|&o| side(out_pos[o])).collect();
    for &o in &targets {
        for col in table[o].iter_mut() {
            *col *= 0.9;
        }
        for &i in &unconnected {
            table[o][i] += 0.1 / n;
        }
    }
}

/// Apply `table` to one frame of interleaved input samples, writing one
/// frame of interleaved output samples.
pub fn apply_frame(table: &MapTable, input_frame: &[f32], output_frame: &mut [f32]) {
    debug_assert_eq!(output_frame.len(), table.len());
    for (o, row) in table.iter().enumerate() {
        let mut acc = 0.0f32;
        for (i, &w) in row.iter().enumerate() {
            if w != 0.0 {
                acc += w * input_frame[i];
            }
        }
        output_frame[o] = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_stereo_is_diagonal() {
        let stereo = ChannelMap::stereo();
        let table = build_map_table(&stereo, &stereo, ResampleFlags::empty());
        assert_eq!(table, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let mono = ChannelMap::mono();
        let stereo = ChannelMap::stereo();
        let table = build_map_table(&mono, &stereo, ResampleFlags::empty());
        assert_eq!(table, vec![vec![1.0], vec![1.0]]);
    }

    #[test]
    fn stereo_to_mono_averages_left_and_right_folds() {
        let stereo = ChannelMap::stereo();
        let mono = ChannelMap::mono();
        let table = build_map_table(&stereo, &mono, ResampleFlags::empty());
        // Mono matches everything in step 1, so the output is fully
        // connected before steps 2-8 run; every input contributes 1.0.
        assert_eq!(table, vec![vec![1.0, 1.0]]);
    }

    #[test]
    fn no_remap_is_index_identity_even_across_positions() {
        let a = ChannelMap::new(vec![ChannelPosition::FrontLeft, ChannelPosition::RearRight]);
        let b = ChannelMap::new(vec![ChannelPosition::FrontCenter, ChannelPosition::LowFrequency]);
        let table = build_map_table(&a, &b, ResampleFlags::NO_REMAP);
        assert_eq!(table, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn five_one_to_stereo_routes_center_and_lfe() {
        let surround = ChannelMap::surround_5_1();
        let stereo = ChannelMap::stereo();
        let table = build_map_table(&surround, &stereo, ResampleFlags::empty());
        // FL/FR connect by identity (step 1). FC (unconnected input
        // center, step 7) and LFE (unconnected input LFE, step 8) fold
        // into both L and R with nonzero weight.
        assert!(table[0][0] > 0.9); // FL dominates left output
        assert!(table[0][2] > 0.0); // FC folded in
        assert!(table[0][3] > 0.0); // LFE folded in
        assert!(table[1][1] > 0.9); // FR dominates right output
    }
}
