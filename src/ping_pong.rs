//! Two-slot buffer arena whose read/write roles swap each step.

/// A pair of buffers: one is read as the current state while the other is
/// written as the next state. [`swap`](Self::swap) flips the roles without
/// moving data.
#[derive(Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    /// Start with `current` readable and `next` as the write target.
    pub fn new(current: T, next: T) -> Self {
        Self { slots: [current, next], current: 0 }
    }

    /// The buffer read this step.
    #[inline]
    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// The buffer written this step.
    #[inline]
    pub fn next(&self) -> &T {
        &self.slots[1 - self.current]
    }

    /// Borrow the current buffer for reading and the next for writing at once.
    #[inline]
    pub fn split(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.slots;
        if self.current == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Index (0 or 1) of the slot currently playing the `current` role.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Make the next buffer current.
    #[inline]
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_then_swap() {
        let mut buffers = PingPong::new(vec![1, 2], vec![0, 0]);
        {
            let (cur, next) = buffers.split();
            for (n, c) in next.iter_mut().zip(cur) {
                *n = c * 10;
            }
        }
        assert_eq!(buffers.current(), &vec![1, 2]);
        buffers.swap();
        assert_eq!(buffers.current(), &vec![10, 20]);
        assert_eq!(buffers.next(), &vec![1, 2]);
        assert_eq!(buffers.current_index(), 1);
    }

    #[test]
    fn test_double_swap_restores_roles() {
        let mut buffers = PingPong::new('a', 'b');
        buffers.swap();
        buffers.swap();
        assert_eq!(*buffers.current(), 'a');
    }
}
