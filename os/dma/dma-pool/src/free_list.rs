use crate::error::FreeListError;
use dma_memory_addresses::VirtualAddress;
use dma_sync::SpinGate;
use std::collections::TryReserveError;

/// Fixed-capacity LIFO stack of free buffer addresses.
///
/// Slots `[head, capacity)` hold the free buffers; allocation takes
/// `slots[head]` and advances `head`, freeing steps `head` back and stores
/// into the vacated slot. Capacity never changes after construction.
pub(crate) struct FreeList {
    gate: SpinGate<FreeStack>,
}

struct FreeStack {
    slots: Box<[VirtualAddress]>,
    head: usize,
}

impl FreeList {
    /// A full list holding `buffers` in iteration order.
    pub fn with_buffers(
        buffers: impl ExactSizeIterator<Item = VirtualAddress>,
    ) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(buffers.len())?;
        slots.extend(buffers);

        Ok(Self {
            gate: SpinGate::new(FreeStack {
                slots: slots.into_boxed_slice(),
                head: 0,
            }),
        })
    }

    pub fn pop(&self) -> Result<VirtualAddress, FreeListError> {
        let mut stack = self.gate.lock();
        let head = stack.head;
        let va = *stack.slots.get(head).ok_or(FreeListError::Exhausted)?;
        stack.head = head + 1;
        Ok(va)
    }

    pub fn push(&self, va: VirtualAddress) -> Result<(), FreeListError> {
        let mut stack = self.gate.lock();
        let (head, capacity) = (stack.head, stack.slots.len());
        match head {
            0 => Err(FreeListError::Full),
            head if head > capacity => Err(FreeListError::Corrupted { head, capacity }),
            head => {
                stack.head = head - 1;
                stack.slots[head - 1] = va;
                Ok(())
            }
        }
    }

    /// Number of buffers currently free.
    pub fn available(&self) -> usize {
        self.gate
            .with_lock(|stack| stack.slots.len().saturating_sub(stack.head))
    }
}
