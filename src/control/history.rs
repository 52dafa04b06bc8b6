/// Fixed-capacity ring of past channel vectors.
///
/// Storage is one flat `capacity * channels` buffer allocated up front; a push
/// overwrites the oldest row once the ring is full.
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    data: Vec<f32>,
    channels: usize,
    capacity: usize,
    write_pos: usize,
    len: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize, channels: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![0.0; capacity * channels],
            channels,
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows currently stored (saturates at capacity).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn push(&mut self, row: &[f32]) {
        let start = self.write_pos * self.channels;
        for (dst, &src) in self.data[start..start + self.channels].iter_mut().zip(row) {
            *dst = src;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    /// Stored rows, oldest first.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        let oldest = if self.is_full() { self.write_pos } else { 0 };
        (0..self.len).map(move |k| {
            let slot = (oldest + k) % self.capacity;
            &self.data[slot * self.channels..(slot + 1) * self.channels]
        })
    }

    /// Column-wise mean of the stored rows (zeros when empty).
    pub fn mean(&self, out: &mut [f32]) {
        out.fill(0.0);
        if self.len == 0 {
            return;
        }
        for row in self.rows() {
            for (m, &v) in out.iter_mut().zip(row) {
                *m += v;
            }
        }
        let n = self.len as f32;
        for m in out.iter_mut() {
            *m /= n;
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrites_oldest() {
        let mut h = HistoryBuffer::new(3, 2);
        for k in 0..5 {
            h.push(&[k as f32, -(k as f32)]);
        }
        assert!(h.is_full());
        let rows: Vec<Vec<f32>> = h.rows().map(|r| r.to_vec()).collect();
        assert_eq!(rows, vec![vec![2.0, -2.0], vec![3.0, -3.0], vec![4.0, -4.0]]);
    }

    #[test]
    fn test_mean_of_partial_history() {
        let mut h = HistoryBuffer::new(8, 2);
        h.push(&[1.0, 0.0]);
        h.push(&[3.0, 2.0]);
        let mut m = [0.0; 2];
        h.mean(&mut m);
        assert_eq!(m, [2.0, 1.0]);
        assert_eq!(h.len(), 2);
    }
}
