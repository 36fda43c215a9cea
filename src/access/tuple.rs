use crate::access::value::Value;
use crate::storage::page::PageId;

/// Unique identifier for a stored tuple: the page it lives on and the slot
/// it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupleId {
    pub page: PageId,
    pub slot: u16,
}

impl TupleId {
    pub fn new(page: PageId, slot: u16) -> Self {
        Self { page, slot }
    }
}

/// A row of values. `id` is `None` until the tuple has been stored in a
/// heap file; delete resolves the target page through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    id: Option<TupleId>,
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { id: None, values }
    }

    pub fn with_id(id: TupleId, values: Vec<Value>) -> Self {
        Self {
            id: Some(id),
            values,
        }
    }

    pub fn id(&self) -> Option<TupleId> {
        self.id
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::TableId;

    #[test]
    fn test_tuple_id_equality() {
        let pid = PageId::new(TableId(1), 0);
        let a = TupleId::new(pid, 3);
        let b = TupleId::new(pid, 3);
        let c = TupleId::new(pid, 4);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fresh_tuple_has_no_id() {
        let tuple = Tuple::new(vec![Value::Int(1)]);
        assert!(tuple.id().is_none());
        assert_eq!(tuple.values(), &[Value::Int(1)]);
    }

    #[test]
    fn test_stored_tuple_carries_id() {
        let id = TupleId::new(PageId::new(TableId(9), 2), 5);
        let tuple = Tuple::with_id(id, vec![Value::Int(7)]);
        assert_eq!(tuple.id(), Some(id));
    }
}
