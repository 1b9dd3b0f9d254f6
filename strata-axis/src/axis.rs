//! Named trees of variables.

use std::cell::OnceCell;

use crate::error::AxisError;
use crate::layout::Layout;
use crate::name::VariableName;

/// A named tree of variables.
///
/// Internal nodes are named sub-axes; leaves are variables carrying an
/// intrinsic base shape. Sibling names are unique, and a node's size is the
/// sum of its descendant leaf sizes. Entries keep their insertion order,
/// which fixes the traversal order of the derived [`Layout`].
///
/// An axis is built once at model-construction time and treated as immutable
/// afterwards; its layout is derived lazily on first use and cached.
#[derive(Debug, Clone, Default)]
pub struct Axis {
    entries: Vec<(String, AxisEntry)>,
    layout: OnceCell<Layout>,
}

#[derive(Debug, Clone)]
pub(crate) enum AxisEntry {
    Variable(Vec<usize>),
    Subaxis(Axis),
}

impl Axis {
    /// An empty axis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable, creating intermediate sub-axes along its path.
    ///
    /// Rejects empty names, zero-element base shapes and any name already
    /// taken by a sibling variable or sub-axis.
    pub fn add_variable(
        &mut self,
        name: impl Into<VariableName>,
        base_shape: &[usize],
    ) -> Result<(), AxisError> {
        let name = name.into();
        if name.is_empty() {
            return Err(AxisError::EmptyName);
        }
        if base_shape.iter().product::<usize>() == 0 {
            return Err(AxisError::ZeroSizeVariable(name));
        }
        self.insert(&name, &name, base_shape)
    }

    /// Mount a fully built axis as a named sub-axis.
    pub fn add_subaxis(&mut self, name: &str, axis: Axis) -> Result<(), AxisError> {
        if name.is_empty() {
            return Err(AxisError::EmptyName);
        }
        if self.entry(name).is_some() {
            return Err(AxisError::DuplicateVariable(VariableName::from(name)));
        }
        self.layout.take();
        self.entries.push((name.to_string(), AxisEntry::Subaxis(axis)));
        Ok(())
    }

    /// The named sub-axis, if present.
    pub fn subaxis(&self, name: &str) -> Option<&Axis> {
        match self.entry(name) {
            Some(AxisEntry::Subaxis(axis)) => Some(axis),
            _ => None,
        }
    }

    /// The named sub-axis, or an error naming it.
    pub fn expect_subaxis(&self, name: &str) -> Result<&Axis, AxisError> {
        self.subaxis(name)
            .ok_or_else(|| AxisError::UnknownSubaxis(name.to_string()))
    }

    /// Direct sub-axis names in insertion order.
    pub fn subaxis_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| match entry {
                AxisEntry::Subaxis(_) => Some(name.as_str()),
                AxisEntry::Variable(_) => None,
            })
            .collect()
    }

    /// Whether this node carries any direct (leaf) variables.
    pub fn has_direct_variables(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, entry)| matches!(entry, AxisEntry::Variable(_)))
    }

    /// Leaf variable paths relative to this node, in traversal order.
    pub fn variable_names(&self) -> Vec<VariableName> {
        self.layout().names().cloned().collect()
    }

    /// Whether the (relative) path names a variable under this node.
    pub fn has_variable(&self, name: &VariableName) -> bool {
        self.variable_base_shape(name).is_some()
    }

    /// Base shape of the variable at the (relative) path, if present.
    pub fn variable_base_shape(&self, name: &VariableName) -> Option<&[usize]> {
        let first = name.first()?;
        match self.entry(first)? {
            AxisEntry::Variable(shape) if name.len() == 1 => Some(shape.as_slice()),
            AxisEntry::Subaxis(axis) if name.len() > 1 => {
                axis.variable_base_shape(&name.peel(1))
            }
            _ => None,
        }
    }

    /// Total leaf size under this node.
    pub fn size(&self) -> usize {
        self.layout().total_size()
    }

    /// The flat layout of this node, derived on first use and cached.
    pub fn layout(&self) -> &Layout {
        self.layout.get_or_init(|| Layout::from_axis(self))
    }

    pub(crate) fn entries(&self) -> &[(String, AxisEntry)] {
        &self.entries
    }

    fn entry(&self, name: &str) -> Option<&AxisEntry> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entry)| entry)
    }

    fn insert(
        &mut self,
        full: &VariableName,
        rest: &VariableName,
        base_shape: &[usize],
    ) -> Result<(), AxisError> {
        self.layout.take();
        // rest is non-empty along the whole descent
        let head = rest.first().unwrap().to_string();
        if rest.len() == 1 {
            if self.entry(&head).is_some() {
                return Err(AxisError::DuplicateVariable(full.clone()));
            }
            self.entries
                .push((head, AxisEntry::Variable(base_shape.to_vec())));
            return Ok(());
        }
        let tail = rest.peel(1);
        match self.entries.iter_mut().find(|(n, _)| *n == head) {
            Some((_, AxisEntry::Subaxis(axis))) => axis.insert(full, &tail, base_shape),
            Some((_, AxisEntry::Variable(_))) => Err(AxisError::DuplicateVariable(full.clone())),
            None => {
                let mut axis = Axis::new();
                axis.insert(full, &tail, base_shape)?;
                self.entries.push((head, AxisEntry::Subaxis(axis)));
                Ok(())
            }
        }
    }
}
