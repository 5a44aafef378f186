use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Variable;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Simulated memory reported to scripts through `ALLMEM`.
pub const TOTAL_MEMORY: u64 = 8 * 1024 * 1024 * 1024;
/// Size recorded for `auto` (or zero) requests.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryKind {
    Regular,
    Virtual,
}

impl MemoryKind {
    fn label(self) -> &'static str {
        match self {
            MemoryKind::Regular => "regular",
            MemoryKind::Virtual => "virtual",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryBlock {
    pub id: i64,
    pub description: String,
    pub size: u64,
    pub kind: MemoryKind,
}

/// Id-keyed bookkeeping of script memory requests. Nothing is allocated.
#[derive(Debug)]
pub struct MemoryLedger {
    blocks: BTreeMap<i64, MemoryBlock>,
    total: u64,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self {
            blocks: BTreeMap::new(),
            total: TOTAL_MEMORY,
        }
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn allocate(
        &mut self,
        description: &str,
        size: Option<u64>,
        id: i64,
        kind: MemoryKind,
    ) -> RuntimeResult<&MemoryBlock> {
        if self.blocks.contains_key(&id) {
            return Err(RuntimeError::Memory {
                message: format!("memory id {id} is already in use"),
            });
        }
        let size = size.filter(|size| *size > 0).unwrap_or(DEFAULT_BLOCK_SIZE);
        info!(id, description, size, kind = kind.label(), "memory block recorded");
        let block = self.blocks.entry(id).or_insert(MemoryBlock {
            id,
            description: description.to_string(),
            size,
            kind,
        });
        Ok(block)
    }

    pub fn free(&mut self, id: i64, mode: i64) -> RuntimeResult<MemoryBlock> {
        let block = self.blocks.remove(&id).ok_or_else(|| RuntimeError::Memory {
            message: format!("memory id {id} not found"),
        })?;
        info!(id, mode, description = %block.description, "memory block released");
        Ok(block)
    }

    pub fn get(&self, id: i64) -> Option<&MemoryBlock> {
        self.blocks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FlameMemory {
    pub name: String,
    pub size: u64,
    data: BTreeMap<String, Variable>,
}

/// Named key/value containers available to scripts in dynamic mode.
#[derive(Debug, Default)]
pub struct DynamicStore {
    containers: HashMap<String, FlameMemory>,
}

impl DynamicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recreating an existing container replaces it.
    pub fn create(&mut self, name: &str, size: u64) {
        self.containers.insert(
            name.to_string(),
            FlameMemory {
                name: name.to_string(),
                size,
                data: BTreeMap::new(),
            },
        );
    }

    pub fn write(&mut self, name: &str, key: &str, value: Variable) -> RuntimeResult<()> {
        let container = self
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::UnknownContainer { name: name.into() })?;
        container.data.insert(key.to_string(), value.renamed(key));
        Ok(())
    }

    pub fn read(&self, name: &str, key: &str) -> RuntimeResult<Variable> {
        let container = self
            .containers
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownContainer { name: name.into() })?;
        container
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| RuntimeError::MissingKey {
                container: name.into(),
                key: key.into(),
            })
    }

    pub fn destroy(&mut self, name: &str) -> RuntimeResult<FlameMemory> {
        self.containers
            .remove(name)
            .ok_or_else(|| RuntimeError::UnknownContainer { name: name.into() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.containers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_size_and_duplicate_ids() {
        let mut ledger = MemoryLedger::new();
        let block = ledger
            .allocate("buffer", None, 1, MemoryKind::Regular)
            .expect("first allocation");
        assert_eq!(block.size, DEFAULT_BLOCK_SIZE);
        assert!(matches!(
            ledger.allocate("again", Some(64), 1, MemoryKind::Virtual),
            Err(RuntimeError::Memory { .. })
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn free_requires_a_known_id() {
        let mut ledger = MemoryLedger::new();
        ledger
            .allocate("scratch", Some(4096), 7, MemoryKind::Virtual)
            .expect("allocation");
        let freed = ledger.free(7, 0).expect("free");
        assert_eq!(freed.kind, MemoryKind::Virtual);
        assert!(ledger.free(7, 0).is_err());
        assert!(ledger.is_empty());
        assert_eq!(ledger.total(), TOTAL_MEMORY);
    }

    #[test]
    fn dynamic_store_round_trip() {
        let mut store = DynamicStore::new();
        store.create("cache", 256);
        store
            .write("cache", "greeting", Variable::string("v", "hello"))
            .expect("write");
        let value = store.read("cache", "greeting").expect("read");
        assert_eq!(value.as_str(), "hello");
        assert_eq!(value.name(), "greeting");
        assert!(matches!(
            store.read("cache", "missing"),
            Err(RuntimeError::MissingKey { .. })
        ));
        store.destroy("cache").expect("destroy");
        assert!(matches!(
            store.write("cache", "k", Variable::integer("v", 1)),
            Err(RuntimeError::UnknownContainer { .. })
        ));
    }
}
