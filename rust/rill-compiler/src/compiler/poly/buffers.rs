//! Buffer sizing from the combined schedule.
//!
//! For every array the writes and reads are mapped into schedule time;
//! cells written not later than `t` and still read after `t` are live at
//! `t`; the per-dimension maximum distance between two simultaneously
//! live cells (earlier dimensions pinned equal) plus one is the buffer
//! extent. Arrays with no readers or unbounded reuse keep an empty size
//! and fall back to `period_offset + period` on the flow dimension and
//! the declared extents elsewhere.

use super::schedule::Scheduled;
use super::set::*;
use super::*;

/// Compute `buffer_size` and `inter_period_dependency` for every array.
pub fn compute_buffers(program: &mut PolyProgram, sched: &Scheduled) {
    let Some(time_rank) = sched
        .combined_schedule
        .maps
        .first()
        .map(|m| m.space.n_out())
    else {
        fill_defaults(program);
        return;
    };
    let time_tuple = Context::anonymous(time_rank);

    let write_scheds = sched
        .combined_schedule
        .map_domain_through(&sched.write_relations);
    let read_scheds = sched
        .combined_schedule
        .map_domain_through(&sched.read_relations);

    let not_later = lex_order_map(time_tuple, false, false);
    let later = lex_order_map(time_tuple, true, true);

    for (a, tuple) in sched.array_tuples.iter().enumerate() {
        let size = compute_buffer_size(
            &write_scheds,
            &read_scheds,
            &not_later,
            &later,
            *tuple,
            program.arrays[a].size.len(),
            time_rank,
        );
        if let Some(size) = size {
            program.arrays[a].buffer_size = size;
        }
    }

    find_inter_period_deps(program, sched);
    fill_defaults(program);
}

#[allow(clippy::too_many_arguments)]
fn compute_buffer_size(
    write_scheds: &UnionMap,
    read_scheds: &UnionMap,
    not_later: &Map,
    later: &Map,
    array_tuple: Tuple,
    rank: usize,
    time_rank: usize,
) -> Option<Vec<i64>> {
    let write_sched = write_scheds.map_with_domain(array_tuple)?;
    let read_sched = read_scheds.map_with_domain(array_tuple)?;
    if write_sched.is_empty() || read_sched.is_empty() {
        return None;
    }

    // t → cells written at or before t.
    let written_not_later = not_later.join(&write_sched.inverse())?;
    // t → cells still read strictly after t.
    let read_later = later.join(&read_sched.inverse())?;
    let buffered = written_not_later.intersect(&read_later);
    if buffered.is_empty() {
        return None;
    }

    // t → (a, b): pairs of cells live at the same time.
    let mut reflection = buffered.product(&buffered)?;
    let mut size = Vec::with_capacity(rank);
    for dim in 0..rank {
        let col_a = time_rank + dim;
        let col_b = time_rank + rank + dim;
        let wrapped_cols = time_rank + 2 * rank;
        let mut objective = vec![0i64; wrapped_cols + 1];
        objective[col_b] = 1;
        objective[col_a] = -1;
        let max_distance = match reflection.wrapped().max_at(&objective) {
            Bound::Value(v) => v,
            // Unbounded reuse distance: fall back to the defaults.
            Bound::Unbounded => return None,
            Bound::Empty => return None,
        };
        size.push(max_distance + 1);
        // Pin this dimension before measuring the next.
        for bm in reflection.basics.iter_mut() {
            let ca = bm.col_out(dim);
            let cb = bm.col_out(rank + dim);
            bm.add_eq(&[(ca, 1), (cb, -1)], 0);
        }
    }
    Some(size)
}

/// An array depends across periods when init-phase writes (finite or
/// early-infinite) are read inside the periodic phase.
fn find_inter_period_deps(program: &mut PolyProgram, sched: &Scheduled) {
    let period_domain = sched.period_schedule_raw.domain();
    for (a, tuple) in sched.array_tuples.iter().enumerate() {
        let read_in_period = sched.read_relations.apply(&period_domain);
        let Some(cells) = read_in_period.set_for(*tuple) else {
            program.arrays[a].inter_period_dependency = false;
            continue;
        };
        let mut cells_only = UnionSet::new();
        cells_only.add(cells.clone());
        let writers = sched.write_relations.inverse().apply(&cells_only);

        if !sched.finite_schedule.in_domain(&writers).is_empty() {
            program.arrays[a].inter_period_dependency = true;
            continue;
        }
        program.arrays[a].inter_period_dependency = false;
        let infinite_writers = sched.infinite_schedule.in_domain(&writers);
        'outer: for map in &infinite_writers.maps {
            for bm in &map.basics {
                let range = bm.range();
                match range.min_var(sched.schedule_flow_dim) {
                    Bound::Value(min_time) if min_time < sched.period_offset => {
                        program.arrays[a].inter_period_dependency = true;
                        break 'outer;
                    }
                    Bound::Unbounded => {
                        // Writes reach arbitrarily far back in time.
                        program.arrays[a].inter_period_dependency = true;
                        break 'outer;
                    }
                    _ => {}
                }
            }
        }
    }
}

fn fill_defaults(program: &mut PolyProgram) {
    for array in program.arrays.iter_mut() {
        if !array.buffer_size.is_empty() {
            continue;
        }
        for (dim, extent) in array.size.iter().enumerate() {
            let n = if Some(dim) == array.flow_dim {
                array.period_offset + array.period
            } else {
                extent.finite().unwrap_or(array.period_offset + array.period)
            };
            array.buffer_size.push(n.max(1));
        }
    }
}
