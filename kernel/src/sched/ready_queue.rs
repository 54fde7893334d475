// kernel/src/sched/ready_queue.rs
//
// Ready queue: singly linked list threaded through slot indices.
//
// - sorted ascending by priority value
// - insert walks past every entry with key <= new key, so equal
//   priorities stay FIFO
// - pop_front is O(1); insert/remove are a linear walk

use super::process::Priority;

pub struct ReadyQueue<const N: usize> {
    head: Option<usize>,
    next: [Option<usize>; N],
    key: [Priority; N],
    queued: [bool; N],
    len: usize,
}

impl<const N: usize> ReadyQueue<N> {
    pub const fn new() -> Self {
        ReadyQueue {
            head: None,
            next: [None; N],
            key: [Priority::Background; N],
            queued: [false; N],
            len: 0,
        }
    }

    /// Returns false if `slot` is out of range or already queued.
    pub fn insert(&mut self, slot: usize, priority: Priority) -> bool {
        if slot >= N || self.queued[slot] {
            return false;
        }
        self.key[slot] = priority;
        self.queued[slot] = true;
        self.len += 1;

        match self.head {
            Some(h) if self.key[h] <= priority => {
                let mut cur = h;
                while let Some(n) = self.next[cur] {
                    if self.key[n] > priority {
                        break;
                    }
                    cur = n;
                }
                self.next[slot] = self.next[cur];
                self.next[cur] = Some(slot);
            }
            _ => {
                self.next[slot] = self.head;
                self.head = Some(slot);
            }
        }
        true
    }

    pub fn pop_front(&mut self) -> Option<usize> {
        let h = self.head?;
        self.head = self.next[h];
        self.next[h] = None;
        self.queued[h] = false;
        self.len -= 1;
        Some(h)
    }

    pub fn remove(&mut self, slot: usize) -> bool {
        if slot >= N || !self.queued[slot] {
            return false;
        }

        if self.head == Some(slot) {
            self.head = self.next[slot];
        } else {
            let mut cur = self.head;
            while let Some(c) = cur {
                if self.next[c] == Some(slot) {
                    self.next[c] = self.next[slot];
                    break;
                }
                cur = self.next[c];
            }
        }

        self.next[slot] = None;
        self.queued[slot] = false;
        self.len -= 1;
        true
    }

    pub fn peek(&self) -> Option<usize> {
        self.head
    }

    pub fn contains(&self, slot: usize) -> bool {
        slot < N && self.queued[slot]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots front to back.
    pub fn iter(&self) -> Iter<'_, N> {
        Iter {
            queue: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    pub fn priority_of(&self, slot: usize) -> Option<Priority> {
        if self.contains(slot) {
            Some(self.key[slot])
        } else {
            None
        }
    }
}

impl<const N: usize> Default for ReadyQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'q, const N: usize> {
    queue: &'q ReadyQueue<N>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'q, const N: usize> Iterator for Iter<'q, N> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let c = self.cursor?;
        self.remaining -= 1;
        self.cursor = self.queue.next[c];
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order<const N: usize>(q: &ReadyQueue<N>) -> Vec<usize> {
        q.iter().collect()
    }

    #[test]
    fn sorted_by_priority_fifo_within_tier() {
        let mut q: ReadyQueue<8> = ReadyQueue::new();
        q.insert(0, Priority::Normal);
        q.insert(1, Priority::High);
        q.insert(2, Priority::Normal);
        q.insert(3, Priority::Critical);
        q.insert(4, Priority::High);
        q.insert(5, Priority::Background);
        assert_eq!(order(&q), [3, 1, 4, 0, 2, 5]);
    }

    #[test]
    fn pop_and_remove() {
        let mut q: ReadyQueue<4> = ReadyQueue::new();
        q.insert(2, Priority::High);
        q.insert(0, Priority::High);
        q.insert(1, Priority::Normal);

        assert!(q.remove(0));
        assert!(!q.remove(0));
        assert_eq!(order(&q), [2, 1]);
        assert_eq!(q.pop_front(), Some(2));
        assert_eq!(q.pop_front(), Some(1));
        assert_eq!(q.pop_front(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn rejects_double_insert_and_bad_slot() {
        let mut q: ReadyQueue<2> = ReadyQueue::new();
        assert!(q.insert(1, Priority::Normal));
        assert!(!q.insert(1, Priority::Critical));
        assert!(!q.insert(2, Priority::Normal));
        assert_eq!(q.len(), 1);
        assert_eq!(q.priority_of(1), Some(Priority::Normal));
    }
}
