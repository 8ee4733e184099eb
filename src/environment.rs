//! The binding table behind every evaluation scope.
//!
//! [`Environment`] is an open-addressing hash table from identifier names to
//! [`Binding`]s. Collisions are resolved by quadratic probing
//! (`(hash + i²) mod capacity`), capacities are kept prime, and deleted entries leave
//! a tombstone so that later probe chains are not cut short. Tombstones are only
//! purged when the table grows.
//!
//! Probing is bounded to `capacity / 2 + 1` steps. With a prime capacity those
//! steps visit distinct slots, and the table never holds more live entries than it
//! can reach within the bound: whenever an insertion or a rehash cannot find a free
//! slot inside the bound, the table grows to the next prime instead.

use std::fmt;

use tracing::{debug, trace};

use crate::Error;
use crate::ast::Value;

/// Load factor threshold used when none is configured
pub const DEFAULT_LOAD_FACTOR: f32 = 0.5;

/// Initial slot count used when none is configured
pub const DEFAULT_CAPACITY: usize = 11;

/// Hash function over identifier bytes
pub type HashFn = fn(&str) -> u64;

/// Equality function over identifier content
pub type EqualsFn = fn(&str, &str) -> bool;

const FNV_OFFSET_BASIS: u64 = 14_695_981_039_346_656_037;
const FNV_PRIME: u64 = 1_099_511_628_211;

/// 64-bit FNV-1 hash (multiply, then xor) over the bytes of `key`
pub fn fnv1_hash(key: &str) -> u64 {
    key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV_PRIME) ^ u64::from(byte)
    })
}

/// Content equality for identifier names
pub fn str_equals(a: &str, b: &str) -> bool {
    a == b
}

pub fn is_prime(num: usize) -> bool {
    if num < 2 {
        return false;
    }
    let mut i = 2;
    while i * i <= num {
        if num % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

/// Smallest prime strictly greater than `current`
pub fn next_prime(current: usize) -> usize {
    let mut next = current + 1;
    while !is_prime(next) {
        next += 1;
    }
    next
}

/// Whether a binding may be reassigned by `var` / `const`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Mutable,
    Constant,
}

/// A value stored in the table together with its mutability flag
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub mutability: Mutability,
}

impl Binding {
    pub fn mutable(value: Value) -> Self {
        Binding {
            value,
            mutability: Mutability::Mutable,
        }
    }

    pub fn constant(value: Value) -> Self {
        Binding {
            value,
            mutability: Mutability::Constant,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.mutability == Mutability::Constant
    }
}

/// Table-internal slot state. A tombstone is never handed to callers; a miss is
/// reported as `None`.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Empty,
    Tombstone,
    Occupied { key: String, binding: Binding },
}

/// Sizing policy for a new table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableConfig {
    /// Grow once `(size + 1) / capacity` would exceed this. `0.0` selects the default.
    pub load_factor: f32,
    /// Starting slot count, rounded up to a prime. `0` selects the default.
    pub initial_capacity: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            load_factor: DEFAULT_LOAD_FACTOR,
            initial_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl TableConfig {
    /// Resolve defaults and reject unusable settings
    pub fn validate(self) -> Result<Self, Error> {
        let load_factor = if self.load_factor == 0.0 {
            DEFAULT_LOAD_FACTOR
        } else {
            self.load_factor
        };
        if !load_factor.is_finite() || load_factor <= 0.0 || load_factor > 1.0 {
            return Err(Error::InvalidConfig(format!(
                "load factor must be in (0, 1], got {load_factor}"
            )));
        }

        let initial_capacity = match self.initial_capacity {
            0 => DEFAULT_CAPACITY,
            n if is_prime(n) => n,
            n => next_prime(n),
        };

        Ok(TableConfig {
            load_factor,
            initial_capacity,
        })
    }
}

/// Environment for identifier bindings
#[derive(Debug, Clone)]
pub struct Environment {
    load_factor: f32,
    size: usize,
    collisions: usize,
    hash_fn: HashFn,
    equals_fn: EqualsFn,
    slots: Vec<Slot>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

fn home_slot(hash_fn: HashFn, key: &str, capacity: usize) -> usize {
    (hash_fn(key) % capacity as u64) as usize
}

fn probe_index(home: usize, step: usize, capacity: usize) -> usize {
    ((home as u64 + (step as u64) * (step as u64)) % capacity as u64) as usize
}

fn probe_bound(capacity: usize) -> usize {
    capacity / 2 + 1
}

impl Environment {
    /// Empty table with FNV-1 hashing, load factor 0.5 and 11 slots
    pub fn new() -> Self {
        Environment::build(fnv1_hash, str_equals, DEFAULT_LOAD_FACTOR, DEFAULT_CAPACITY)
    }

    /// Empty table with the default hash and equality functions
    pub fn with_config(config: TableConfig) -> Result<Self, Error> {
        Environment::init(
            fnv1_hash,
            str_equals,
            config.load_factor,
            config.initial_capacity,
        )
    }

    /// Empty table with caller-chosen hashing. A `load_factor` of `0.0` or a
    /// `capacity` of `0` selects the defaults.
    pub fn init(
        hash_fn: HashFn,
        equals_fn: EqualsFn,
        load_factor: f32,
        capacity: usize,
    ) -> Result<Self, Error> {
        let config = TableConfig {
            load_factor,
            initial_capacity: capacity,
        }
        .validate()?;
        debug!(
            load_factor = config.load_factor,
            capacity = config.initial_capacity,
            "creating environment"
        );
        Ok(Environment::build(
            hash_fn,
            equals_fn,
            config.load_factor,
            config.initial_capacity,
        ))
    }

    fn build(hash_fn: HashFn, equals_fn: EqualsFn, load_factor: f32, capacity: usize) -> Self {
        Environment {
            load_factor,
            size: 0,
            collisions: 0,
            hash_fn,
            equals_fn,
            slots: vec![Slot::Empty; capacity],
        }
    }

    /// Number of live bindings
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total probe steps taken to place the live entries
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Configured growth threshold
    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    /// Live bindings divided by capacity
    pub fn current_load(&self) -> f32 {
        self.size as f32 / self.capacity() as f32
    }

    /// Number of deleted slots awaiting the next resize
    pub fn tombstones(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Tombstone))
            .count()
    }

    /// Slot index holding `key`, if it is reachable within the probe bound
    fn find_index(&self, key: &str) -> Option<usize> {
        let capacity = self.capacity();
        let home = home_slot(self.hash_fn, key, capacity);
        for step in 0..probe_bound(capacity) {
            let index = probe_index(home, step, capacity);
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Tombstone => continue,
                Slot::Occupied { key: existing, .. } if (self.equals_fn)(existing, key) => {
                    return Some(index);
                }
                Slot::Occupied { .. } => {}
            }
        }
        None
    }

    /// First empty or tombstone slot on `key`'s probe sequence and the step it was found at
    fn first_available(&self, key: &str) -> Option<(usize, usize)> {
        let capacity = self.capacity();
        let home = home_slot(self.hash_fn, key, capacity);
        (0..probe_bound(capacity)).find_map(|step| {
            let index = probe_index(home, step, capacity);
            match self.slots[index] {
                Slot::Empty | Slot::Tombstone => Some((index, step)),
                Slot::Occupied { .. } => None,
            }
        })
    }

    fn exceeds_load(&self, size: usize) -> bool {
        size as f32 / self.capacity() as f32 > self.load_factor
    }

    /// Insert or update `key`. Returns the previous binding when the key was present.
    pub fn insert(&mut self, key: &str, binding: Binding) -> Option<Binding> {
        if let Some(index) = self.find_index(key)
            && let Slot::Occupied {
                binding: existing, ..
            } = &mut self.slots[index]
        {
            return Some(std::mem::replace(existing, binding));
        }

        while self.exceeds_load(self.size + 1) {
            self.resize(next_prime(self.capacity()));
        }

        loop {
            if let Some((index, step)) = self.first_available(key) {
                self.slots[index] = Slot::Occupied {
                    key: key.to_owned(),
                    binding,
                };
                self.size += 1;
                self.collisions += step;
                return None;
            }
            // Every reachable slot is taken; only a larger table helps
            self.resize(next_prime(self.capacity()));
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&Binding> {
        self.find_index(key).and_then(|index| match &self.slots[index] {
            Slot::Occupied { binding, .. } => Some(binding),
            Slot::Empty | Slot::Tombstone => None,
        })
    }

    /// Remove `key`, leaving a tombstone in its slot
    pub fn delete(&mut self, key: &str) -> Option<Binding> {
        let index = self.find_index(key)?;
        match std::mem::replace(&mut self.slots[index], Slot::Tombstone) {
            Slot::Occupied { binding, .. } => {
                self.size -= 1;
                Some(binding)
            }
            other => {
                self.slots[index] = other;
                None
            }
        }
    }

    /// Independent duplicate of this table, used as a call frame
    pub fn copy(&self) -> Self {
        trace!(size = self.size, capacity = self.capacity(), "copying environment");
        self.clone()
    }

    /// Live bindings sorted by name
    pub fn bindings(&self) -> Vec<(&str, &Binding)> {
        let mut result: Vec<_> = self
            .slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Occupied { key, binding } => Some((key.as_str(), binding)),
                Slot::Empty | Slot::Tombstone => None,
            })
            .collect();
        result.sort_by(|a, b| a.0.cmp(b.0));
        result
    }

    /// Rehash every live entry into at least `requested` slots, dropping tombstones
    fn resize(&mut self, requested: usize) {
        let old_capacity = self.capacity();
        let entries: Vec<(String, Binding)> = std::mem::take(&mut self.slots)
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Occupied { key, binding } => Some((key, binding)),
                Slot::Empty | Slot::Tombstone => None,
            })
            .collect();

        let mut capacity = requested;
        let (indices, collisions) = loop {
            match plan_rehash(&entries, capacity, self.hash_fn) {
                Some(plan) => break plan,
                None => capacity = next_prime(capacity),
            }
        };

        let mut slots = vec![Slot::Empty; capacity];
        for ((key, binding), index) in entries.into_iter().zip(indices) {
            slots[index] = Slot::Occupied { key, binding };
        }
        self.slots = slots;
        self.collisions = collisions;

        debug!(
            old_capacity,
            new_capacity = capacity,
            size = self.size,
            collisions,
            "resized environment"
        );
    }
}

/// Slot index for every entry in a fresh table of `capacity` slots, plus the total
/// probe steps. `None` when some entry finds no empty slot within the probe bound.
fn plan_rehash(
    entries: &[(String, Binding)],
    capacity: usize,
    hash_fn: HashFn,
) -> Option<(Vec<usize>, usize)> {
    let mut taken = vec![false; capacity];
    let mut indices = Vec::with_capacity(entries.len());
    let mut collisions = 0;

    for (key, _) in entries {
        let home = home_slot(hash_fn, key, capacity);
        let step = (0..probe_bound(capacity)).find(|&step| !taken[probe_index(home, step, capacity)])?;
        let index = probe_index(home, step, capacity);
        taken[index] = true;
        indices.push(index);
        collisions += step;
    }

    Some((indices, collisions))
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let average_steps = if self.size == 0 {
            0.0
        } else {
            self.collisions as f32 / self.size as f32
        };

        writeln!(f, "Size: {}", self.size)?;
        writeln!(f, "Capacity: {}", self.capacity())?;
        writeln!(f, "Collisions: {}", self.collisions)?;
        writeln!(f, "Average Steps Per Element: {average_steps:.6}")?;
        writeln!(f, "Desired Load Factor: {:.6}", self.load_factor)?;
        writeln!(f, "Current Load Factor: {:.6}", self.current_load())?;
        for (index, slot) in self.slots.iter().enumerate() {
            let (key, value) = match slot {
                Slot::Empty => ("EMPTY".to_owned(), "EMPTY".to_owned()),
                Slot::Tombstone => ("TOMBSTONE".to_owned(), "TOMBSTONE".to_owned()),
                Slot::Occupied { key, binding } if binding.is_constant() => {
                    (key.clone(), format!("const {}", binding.value))
                }
                Slot::Occupied { key, binding } => (key.clone(), binding.value.to_string()),
            };
            writeln!(f, "Index: {index:3}, Key: {key:>16}, Value: {value:>16}")?;
        }
        Ok(())
    }
}
