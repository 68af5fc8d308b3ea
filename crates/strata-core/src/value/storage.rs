use crate::value::Value;
use std::sync::Arc;
use strata_schema::types::UnifiedFieldOrdinal;

///
/// FieldStorage
///
/// Field values of one object, indexed by unified ordinal. Storage filled
/// from a cache entry shares that entry's buffer until the first write.
///

#[derive(Clone, Debug)]
pub enum FieldStorage {
    Owned(Vec<Value>),
    SharedFromCache(Arc<[Value]>),
}

impl FieldStorage {
    /// All-null storage for `len` fields.
    #[must_use]
    pub fn nulls(len: usize) -> Self {
        Self::Owned(vec![Value::Null; len])
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        match self {
            Self::Owned(values) => values,
            Self::SharedFromCache(values) => values,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    #[must_use]
    pub const fn is_shared(&self) -> bool {
        matches!(self, Self::SharedFromCache(_))
    }

    #[must_use]
    pub fn get(&self, ordinal: UnifiedFieldOrdinal) -> Option<&Value> {
        self.as_slice().get(ordinal.index())
    }

    /// Detach from a shared cache buffer, copying it once.
    pub fn make_owned(&mut self) {
        if let Self::SharedFromCache(shared) = self {
            *self = Self::Owned(shared.to_vec());
        }
    }

    /// Write one field, copying a shared buffer first.
    pub fn set(&mut self, ordinal: UnifiedFieldOrdinal, value: Value) {
        self.make_owned();
        if let Self::Owned(values) = self
            && let Some(slot) = values.get_mut(ordinal.index())
        {
            *slot = value;
        }
    }

    /// Snapshot for handing to a cache.
    #[must_use]
    pub fn to_shared(&self) -> Arc<[Value]> {
        match self {
            Self::Owned(values) => values.as_slice().into(),
            Self::SharedFromCache(values) => Arc::clone(values),
        }
    }
}

///
/// DirtyFlags
///
/// One bit per unified field.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DirtyFlags {
    words: Vec<u64>,
}

impl DirtyFlags {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// All `len` bits set.
    #[must_use]
    pub fn all(len: usize) -> Self {
        let mut flags = Self::new(len);
        for i in 0..len {
            flags.set(UnifiedFieldOrdinal::new(i));
        }

        flags
    }

    const fn locate(ordinal: UnifiedFieldOrdinal) -> (usize, u64) {
        let index = ordinal.index();
        (index / 64, 1u64 << (index % 64))
    }

    pub fn set(&mut self, ordinal: UnifiedFieldOrdinal) {
        let (word, bit) = Self::locate(ordinal);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= bit;
    }

    pub fn clear(&mut self, ordinal: UnifiedFieldOrdinal) {
        let (word, bit) = Self::locate(ordinal);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !bit;
        }
    }

    #[must_use]
    pub fn is_set(&self, ordinal: UnifiedFieldOrdinal) -> bool {
        let (word, bit) = Self::locate(ordinal);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Set ordinals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = UnifiedFieldOrdinal> + '_ {
        self.words.iter().enumerate().flat_map(|(w, word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| UnifiedFieldOrdinal::new(w * 64 + bit))
        })
    }
}
