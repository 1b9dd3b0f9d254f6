//! Conversion between flat tensors and named collections of blocks.
//!
//! A [`Layout`] fixes where each variable lives inside a flat vector;
//! [`assemble`] and [`disassemble`] move values in and out of that flat form,
//! and [`assemble_matrix`] does the same for `(row, column)` blocks of a flat
//! matrix. Batch shapes broadcast group-wise across all participating
//! values, so blocks with fewer batch axes stretch to the common shape.

use strata_core::{broadcast, ix, Element, Tensor};

use crate::error::AxisError;
use crate::layout::Layout;

/// Concatenate named values into a flat vector per the layout.
///
/// Each value's base elements are flattened into its slot's range; the
/// result's batch shape is the mutual group-wise broadcast of all input
/// batch shapes and its base shape is `[layout.total_size()]`.
pub fn assemble<E: Element>(
    values: &[Tensor<E>],
    layout: &Layout,
) -> Result<Tensor<E>, AxisError> {
    if values.len() != layout.len() {
        return Err(AxisError::ValueCount {
            expected: layout.len(),
            got: values.len(),
        });
    }
    for (value, entry) in values.iter().zip(layout.entries()) {
        if value.base_numel() != entry.size {
            return Err(AxisError::SizeMismatch {
                name: entry.name.clone(),
                declared: value.base_numel(),
                expected: entry.size,
            });
        }
    }

    let (dynamic, intmd) = common_batch(values.iter())?;
    let mut sizes: Vec<usize> = dynamic.iter().chain(&intmd).copied().collect();
    sizes.push(layout.total_size());
    let out = Tensor::zeros(&sizes, dynamic.len(), intmd.len())?;

    for (value, entry) in values.iter().zip(layout.entries()) {
        let value = value.broadcast_to_groups(&dynamic, &intmd, value.base_shape())?;
        let flat = value.base_flatten();
        let mut slot = out.base().index(ix![entry.range()])?;
        slot.assign(&flat)?;
    }
    Ok(out)
}

/// Slice a flat vector back into named values per the layout.
///
/// The inverse of [`assemble`]: each slot's range is cut out of the base
/// axis and reshaped to the variable's declared base shape. The returned
/// tensors view the flat tensor's storage.
pub fn disassemble<E: Element>(
    flat: &Tensor<E>,
    layout: &Layout,
) -> Result<Vec<Tensor<E>>, AxisError> {
    if flat.base_dim() != 1 || flat.base_numel() != layout.total_size() {
        return Err(AxisError::FlatMismatch {
            expected: layout.total_size(),
            got: flat.base_shape().to_vec(),
        });
    }
    layout
        .entries()
        .iter()
        .map(|entry| {
            let slot = flat.base().index(ix![entry.range()])?;
            Ok(slot.base_reshape(&entry.base_shape)?)
        })
        .collect()
}

/// Place `(row slot, column slot) → block` entries into a flat matrix.
///
/// The result has base shape `[rows.total_size(), cols.total_size()]`;
/// slots without a block stay zero, and multiple blocks addressed to one
/// slot pair accumulate. Each block's base elements must match its
/// `row size x column size` rectangle.
pub fn assemble_matrix<E: Element>(
    blocks: &[((usize, usize), Tensor<E>)],
    rows: &Layout,
    cols: &Layout,
) -> Result<Tensor<E>, AxisError> {
    for &((row, col), ref block) in blocks {
        let (r, c) = match (rows.get(row), cols.get(col)) {
            (Some(r), Some(c)) => (r, c),
            _ => {
                return Err(AxisError::BlockSlot {
                    row,
                    col,
                    rows: rows.len(),
                    cols: cols.len(),
                })
            }
        };
        if block.base_numel() != r.size * c.size {
            return Err(AxisError::BlockMismatch {
                row,
                col,
                got: block.base_numel(),
                expected: r.size * c.size,
            });
        }
    }

    let (dynamic, intmd) = common_batch(blocks.iter().map(|(_, block)| block))?;
    let mut sizes: Vec<usize> = dynamic.iter().chain(&intmd).copied().collect();
    sizes.push(rows.total_size());
    sizes.push(cols.total_size());
    let out = Tensor::zeros(&sizes, dynamic.len(), intmd.len())?;

    for ((row, col), block) in blocks {
        // slot existence was checked above
        let r = rows.get(*row).unwrap();
        let c = cols.get(*col).unwrap();
        let block = block.broadcast_to_groups(&dynamic, &intmd, block.base_shape())?;
        let rect = block.base_reshape(&[r.size, c.size])?;
        let mut slot = out.base().index(ix![r.range(), c.range()])?;
        slot.accumulate(&rect)?;
    }
    Ok(out)
}

/// Mutual group-wise broadcast of the batch shapes of a set of tensors.
fn common_batch<'a, E: Element + 'a>(
    tensors: impl Iterator<Item = &'a Tensor<E>>,
) -> Result<(Vec<usize>, Vec<usize>), AxisError> {
    let mut dynamic = Vec::new();
    let mut intmd = Vec::new();
    for t in tensors {
        dynamic = broadcast(&dynamic, t.dynamic_shape(), "dynamic")?;
        intmd = broadcast(&intmd, t.intmd_shape(), "intmd")?;
    }
    Ok((dynamic, intmd))
}
