/// Size of an activation frame header: saved display value + return address.
/// Local variable offsets start past it.
pub const FRAME_HEADER: i64 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Named literal, inlined at every use site.
    Const { name: String, value: i64 },
    /// Local variable; `addr` is a non-negative offset from the frame base.
    Var { name: String, level: usize, addr: i64 },
    /// Parameter; `addr` is negative (arguments sit below the frame header).
    Par { name: String, level: usize, addr: i64 },
    /// Function; `entry` is the instruction index of its body.
    Func {
        name: String,
        level: usize,
        entry: usize,
        params: usize,
    },
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Const { name, .. }
            | Entry::Var { name, .. }
            | Entry::Par { name, .. }
            | Entry::Func { name, .. } => name,
        }
    }
}

/// One ordered table shared by every lexical level.
///
/// A level's entries occupy a contiguous suffix. Opening a scope saves
/// `(table length, next local address)`; closing it truncates the table back
/// to that mark, which is what discards the block's declarations and
/// re-exposes shadowed outer names. Lookup scans in reverse so the most
/// recently declared visible entry wins.
pub struct SymbolTable {
    entries: Vec<Entry>,
    level: usize,
    local_addr: i64,
    saved: Vec<(usize, i64)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            entries: Vec::new(),
            level: 0,
            local_addr: FRAME_HEADER,
            saved: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Appends an entry; returns its index, stable for the entry's lifetime.
    pub fn define(&mut self, entry: Entry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Claims the next free frame offset for a variable at the current level.
    pub fn alloc_local(&mut self) -> i64 {
        let addr = self.local_addr;
        self.local_addr += 1;
        addr
    }

    /// Most recently declared visible entry with this name.
    pub fn resolve(&self, name: &str) -> Option<Entry> {
        self.entries.iter().rev().find(|e| e.name() == name).cloned()
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut Entry {
        &mut self.entries[index]
    }

    pub fn enter_scope(&mut self) {
        self.saved.push((self.entries.len(), self.local_addr));
        self.local_addr = FRAME_HEADER;
        self.level += 1;
    }

    pub fn exit_scope(&mut self) {
        if let Some((len, addr)) = self.saved.pop() {
            self.entries.truncate(len);
            self.local_addr = addr;
            self.level -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, level: usize, addr: i64) -> Entry {
        Entry::Var {
            name: name.to_string(),
            level,
            addr,
        }
    }

    #[test]
    fn test_resolve_finds_most_recent() {
        let mut table = SymbolTable::new();
        table.define(var("x", 0, 2));
        table.define(var("y", 0, 3));
        table.define(var("x", 0, 4));
        assert_eq!(table.resolve("x"), Some(var("x", 0, 4)));
        assert_eq!(table.resolve("y"), Some(var("y", 0, 3)));
        assert_eq!(table.resolve("z"), None);
    }

    #[test]
    fn test_exit_scope_truncates_and_unshadows() {
        let mut table = SymbolTable::new();
        table.define(var("x", 0, 2));
        table.enter_scope();
        table.define(var("x", 1, 2));
        table.define(var("inner", 1, 3));
        assert_eq!(table.resolve("x"), Some(var("x", 1, 2)));

        table.exit_scope();
        assert_eq!(table.resolve("x"), Some(var("x", 0, 2)));
        assert_eq!(table.resolve("inner"), None);
    }

    #[test]
    fn test_local_addresses_restart_per_scope() {
        let mut table = SymbolTable::new();
        assert_eq!(table.alloc_local(), FRAME_HEADER);
        assert_eq!(table.alloc_local(), FRAME_HEADER + 1);

        table.enter_scope();
        assert_eq!(table.level(), 1);
        assert_eq!(table.alloc_local(), FRAME_HEADER);

        table.exit_scope();
        assert_eq!(table.level(), 0);
        // Restored where the outer scope left off.
        assert_eq!(table.alloc_local(), FRAME_HEADER + 2);
    }

    #[test]
    fn test_func_entry_mutable_in_place() {
        let mut table = SymbolTable::new();
        let idx = table.define(Entry::Func {
            name: "f".to_string(),
            level: 0,
            entry: 5,
            params: 0,
        });
        if let Entry::Func { params, .. } = table.entry_mut(idx) {
            *params = 2;
        }
        assert_eq!(
            table.resolve("f"),
            Some(Entry::Func {
                name: "f".to_string(),
                level: 0,
                entry: 5,
                params: 2,
            })
        );
    }
}
