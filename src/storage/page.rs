pub mod heap_page;

/// Bytes per page, including the occupancy bitmap header.
pub const PAGE_SIZE: usize = 4096;

/// Identifies one heap file (table). Derived deterministically from the
/// backing file's location, so the same table always maps to the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub u32);

/// Address of one fixed-size block: which table, and which block within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub table: TableId,
    pub page_no: u32,
}

impl PageId {
    pub fn new(table: TableId, page_no: u32) -> Self {
        Self { table, page_no }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.table.0, self.page_no)
    }
}

pub use heap_page::HeapPage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_equality() {
        let a = PageId::new(TableId(1), 0);
        let b = PageId::new(TableId(1), 0);
        let c = PageId::new(TableId(1), 1);
        let d = PageId::new(TableId(2), 0);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_page_id_display() {
        let pid = PageId::new(TableId(7), 42);
        assert_eq!(format!("{}", pid), "7:42");
    }
}
