/// Row-major flat grid. No per-cell objects.
/// Bounded plane: no wrapping at any edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    pub data: Vec<T>,
    pub w: usize,
    pub h: usize,
}

impl<T: Copy + Default> Grid<T> {
    /// Panics if `w * h` overflows. Use `try_new` for untrusted sizes.
    pub fn new(w: usize, h: usize) -> Self {
        Self::filled(w, h, T::default())
    }

    pub fn square(n: usize) -> Self {
        Self::new(n, n)
    }

    /// Panics if `w * h` overflows. Use `try_filled` for untrusted sizes.
    pub fn filled(w: usize, h: usize, v: T) -> Self {
        match Self::try_filled(w, h, v) {
            Some(g) => g,
            None => panic!("grid {w}x{h} overflows usize"),
        }
    }

    pub fn try_new(w: usize, h: usize) -> Option<Self> {
        Self::try_filled(w, h, T::default())
    }

    /// None if the cell count overflows.
    pub fn try_filled(w: usize, h: usize, v: T) -> Option<Self> {
        let n = w.checked_mul(h)?;
        Some(Self {
            data: vec![v; n],
            w,
            h,
        })
    }

    /// Build from nested rows (`rows[y][x]`). Returns None if rows are ragged.
    pub fn from_rows(rows: &[Vec<T>]) -> Option<Self> {
        let h = rows.len();
        let w = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != w) {
            return None;
        }
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Some(Self { data, w, h })
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.w && y < self.h);
        y * self.w + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: T) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    pub fn fill(&mut self, v: T) {
        self.data.fill(v);
    }

    pub fn to_rows(&self) -> Vec<Vec<T>> {
        if self.w == 0 {
            return vec![Vec::new(); self.h];
        }
        self.data.chunks(self.w).map(<[T]>::to_vec).collect()
    }
}

const OFFSETS8: [(i32, i32); 8] = [
    (-1, -1), (0, -1), (1, -1),
    (-1, 0),           (1, 0),
    (-1, 1),  (0, 1),  (1, 1),
];

/// 8-connected neighbors, clipped at the grid edges.
pub fn neighbors8(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    let mut out = [(0usize, 0usize); 8];
    let mut n = 0;
    for (dx, dy) in OFFSETS8 {
        let nx = x as i64 + dx as i64;
        let ny = y as i64 + dy as i64;
        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
            continue;
        }
        out[n] = (nx as usize, ny as usize);
        n += 1;
    }
    out.into_iter().take(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_has_three_neighbors() {
        let n: Vec<_> = neighbors8(0, 0, 4, 4).collect();
        assert_eq!(n, vec![(1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn interior_has_eight_neighbors() {
        assert_eq!(neighbors8(2, 2, 5, 5).count(), 8);
        assert!(neighbors8(2, 2, 5, 5).all(|(x, y)| x < 5 && y < 5));
    }

    #[test]
    fn single_cell_grid_has_no_neighbors() {
        assert_eq!(neighbors8(0, 0, 1, 1).count(), 0);
    }

    #[test]
    fn try_new_reports_overflow() {
        assert!(Grid::<f64>::try_new(1 << 32, 1 << 32).is_none());
        assert!(Grid::<u8>::try_filled(usize::MAX, 2, 0).is_none());
        let g = Grid::<u8>::try_filled(3, 2, 7).unwrap();
        assert_eq!(g.data, vec![7; 6]);
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(Grid::<f64>::from_rows(&rows).is_none());
    }

    #[test]
    fn from_rows_is_row_major() {
        let rows = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let g = Grid::<i32>::from_rows(&rows).unwrap();
        assert_eq!((g.w, g.h), (3, 2));
        assert_eq!(g.get(2, 1), 6);
        assert_eq!(g.get(0, 1), 4);
        assert_eq!(g.to_rows(), rows);
    }
}
