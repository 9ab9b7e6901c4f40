//! Optimistic patch engine
//!
//! Pure list transforms. Inputs are never mutated; each function returns a
//! new list that callers hand to [`EntityStore::modify`](crate::store::EntityStore::modify).

/// Anything that lives in a relation list and carries an id
pub trait Identified: Clone {
    fn id(&self) -> i64;
}

/// Add `record` at the end of the list.
///
/// An element already carrying the same id is replaced in place instead, so
/// ids stay unique within the list.
pub fn append<T: Identified>(list: &[T], record: T) -> Vec<T> {
    let mut next = list.to_vec();
    match next.iter().position(|r| r.id() == record.id()) {
        Some(index) => next[index] = record,
        None => next.push(record),
    }
    next
}

/// Drop every element whose id equals `id`
pub fn remove_by_id<T: Identified>(list: &[T], id: i64) -> Vec<T> {
    list.iter().filter(|r| r.id() != id).cloned().collect()
}

/// Insert `record` at `index` (clamped to the list length), dropping any
/// element with the same id first.
pub fn insert_at<T: Identified>(list: &[T], index: usize, record: T) -> Vec<T> {
    let mut next = remove_by_id(list, record.id());
    let index = index.min(next.len());
    next.insert(index, record);
    next
}

pub fn position_of<T: Identified>(list: &[T], id: i64) -> Option<usize> {
    list.iter().position(|r| r.id() == id)
}

/// Replace the element that stood in for `record`.
///
/// The first element satisfying `matches` takes `record`'s place; any later
/// match, and any other element already carrying `record`'s id, is dropped.
/// When nothing matches the record is appended.
pub fn replace_matching<T, F>(list: &[T], matches: F, record: T) -> Vec<T>
where
    T: Identified,
    F: Fn(&T) -> bool,
{
    let mut next = Vec::with_capacity(list.len() + 1);
    let mut placed = false;

    for existing in list {
        if matches(existing) {
            if !placed {
                next.push(record.clone());
                placed = true;
            }
        } else if existing.id() != record.id() {
            next.push(existing.clone());
        }
    }

    if !placed {
        next.push(record);
    }
    next
}
