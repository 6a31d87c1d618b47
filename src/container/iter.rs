//! Fail-fast enumeration of live slots

use crate::error::{Result, StreamKvError};
use crate::stream::SlotDescriptor;

use super::{ContainerState, ObjectContainer};

/// Iterator over live slots
///
/// Snapshots the container generation when created. Each step re-enters the
/// container and yields `ConcurrentModification` if any mutation happened in
/// between; the iterator is exhausted after the first error.
pub struct ContainerIter<'a, F> {
    container: &'a ObjectContainer,
    expected: u64,
    next: u64,
    done: bool,
    read: F,
}

impl<'a, F> ContainerIter<'a, F> {
    pub(crate) fn new(container: &'a ObjectContainer, expected: u64, read: F) -> Self {
        Self {
            container,
            expected,
            next: 0,
            done: false,
            read,
        }
    }

    fn fail<T>(&mut self, error: StreamKvError) -> Option<Result<T>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<'a, T, F> Iterator for ContainerIter<'a, F>
where
    F: FnMut(&mut ContainerState, u64, &SlotDescriptor) -> Result<T>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut scope = match self.container.enter_access_scope() {
            Ok(scope) => scope,
            Err(e) => return self.fail(e),
        };

        let found = scope.generation();
        if found != self.expected {
            drop(scope);
            return self.fail(StreamKvError::ConcurrentModification {
                expected: self.expected,
                found,
            });
        }

        while self.next < scope.total_slots() {
            let index = self.next;
            self.next += 1;

            let descriptor = match scope.descriptor(index) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    drop(scope);
                    return self.fail(e);
                }
            };
            if !descriptor.is_live() {
                continue;
            }

            let item = (self.read)(&mut *scope, index, &descriptor);
            if item.is_err() {
                self.done = true;
            }
            return Some(item);
        }

        self.done = true;
        None
    }
}
