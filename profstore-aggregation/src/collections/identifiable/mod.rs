// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod string_id;

use anyhow::Context;
use std::hash::{BuildHasherDefault, Hash};
use std::num::NonZeroU32;

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type FxHashMap<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;

pub use string_id::*;

pub trait Id: Copy + Eq + Hash {
    type RawId;

    /// Convert from a usize offset into an Id. This should be loss-less
    /// except for certain edges.
    /// # Panics
    /// Panic if the usize cannot be represented in the Id, for instance if
    /// the offset cannot fit in the underlying integer type. This is expected
    /// to be ultra-rare (more than u32::MAX-1 items created?!).
    fn from_offset(inner: usize) -> Self;

    fn to_offset(self) -> usize;

    fn to_raw_id(self) -> Self::RawId;
}

pub trait Item: Eq + Hash {
    /// The Id associated with this Item, e.g. Function -> FunctionId.
    type Id: Id;
}

/// Used to associate an Item with a pprof message. Not all Items can be
/// converted. For example, a StackTrace has no pprof counterpart; it is
/// flattened into its Sample.
pub trait PprofItem: Item {
    type PprofMessage;

    /// Items don't store their own id, the container they live in does, so
    /// the id has to be handed in.
    fn to_pprof(&self, id: Self::Id) -> Self::PprofMessage;
}

/// Creates a non-zero, 32-bit unsigned id from the offset. It's guaranteed to
/// be the offset + 1, with guards to not overflow the size of u32.
///
/// Canonical location ids are built this way, which keeps 0 free for the
/// synthetic root of every tree.
#[inline]
pub fn small_non_zero_pprof_id(offset: usize) -> Option<NonZeroU32> {
    let small: u32 = offset.try_into().ok()?;
    let non_zero = small.checked_add(1)?;
    NonZeroU32::new(non_zero)
}

/// Checks that `offset` can still be handed out as an id before anything is
/// stored under it.
pub fn checked_id<I: Id>(offset: usize) -> anyhow::Result<I> {
    small_non_zero_pprof_id(offset).with_context(|| format!("invalid id generated {:?}", offset))?;
    Ok(I::from_offset(offset))
}

pub trait Dedup<T: Item> {
    /// Deduplicate the Item, and check if the generated Id is valid. A new
    /// item is only stored when its Id is.
    fn checked_dedup(&mut self, item: T) -> anyhow::Result<<T as Item>::Id>;
}

impl<T: Item> Dedup<T> for FxIndexSet<T> {
    fn checked_dedup(&mut self, item: T) -> anyhow::Result<<T as Item>::Id> {
        if let Some(offset) = self.get_index_of(&item) {
            return Ok(<T as Item>::Id::from_offset(offset));
        }
        let id = checked_id(self.len())?;
        self.insert(item);
        Ok(id)
    }
}

pub fn to_pprof_iter<T: PprofItem>(
    collection: &FxIndexSet<T>,
) -> impl Iterator<Item = T::PprofMessage> + '_ {
    collection
        .iter()
        .enumerate()
        .map(|(index, item)| item.to_pprof(<T as Item>::Id::from_offset(index)))
}
