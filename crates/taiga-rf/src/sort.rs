//! Dual-key sort: an introspective quicksort that reorders a float key slice
//! and a sample-index slice in lockstep.
//!
//! Split finding is dominated by sorting each candidate feature column at
//! every node. Sorting the keys and the node's index slice together (instead
//! of sorting `(value, index)` pairs through a comparator) keeps the inner
//! loop branch-light and allocation-free.
//!
//! Quicksort follows Bentley and McIlroy, "Engineering a Sort Function",
//! SP&E November 1993, with an insertion-sort cutoff for short runs and a
//! heapsort fallback once recursion depth exceeds `2*ceil(log2(n+1))`.

#[inline]
fn swap(x: &mut [f64], inx: &mut [usize], i: usize, j: usize) {
    x.swap(i, j);
    inx.swap(i, j);
}

fn insertion_sort(x: &mut [f64], inx: &mut [usize], a: usize, b: usize) {
    for i in a + 1..b {
        let mut j = i;
        while j > a && x[j] < x[j - 1] {
            swap(x, inx, j, j - 1);
            j -= 1;
        }
    }
}

// sift_down restores the heap property on [lo, hi); `first` is the offset of
// the heap root within the slice.
fn sift_down(x: &mut [f64], inx: &mut [usize], lo: usize, hi: usize, first: usize) {
    let mut root = lo;
    loop {
        let mut child = 2 * root + 1;
        if child >= hi {
            return;
        }
        if child + 1 < hi && x[first + child] < x[first + child + 1] {
            child += 1;
        }
        if x[first + root] >= x[first + child] {
            return;
        }
        swap(x, inx, first + root, first + child);
        root = child;
    }
}

fn heap_sort(x: &mut [f64], inx: &mut [usize], a: usize, b: usize) {
    let first = a;
    let hi = b - a;

    // Build heap with the greatest element at the top.
    for i in (0..=(hi - 1) / 2).rev() {
        sift_down(x, inx, i, hi, first);
    }

    // Pop elements, largest first, into the end of the slice.
    for i in (1..hi).rev() {
        swap(x, inx, first, first + i);
        sift_down(x, inx, 0, i, first);
    }
}

// Moves the median of x[a], x[b], x[c] into x[a].
fn median_of_three(x: &mut [f64], inx: &mut [usize], a: usize, b: usize, c: usize) {
    let m0 = b;
    let m1 = a;
    let m2 = c;
    // bubble sort on 3 elements
    if x[m1] < x[m0] {
        swap(x, inx, m1, m0);
    }
    if x[m2] < x[m1] {
        swap(x, inx, m2, m1);
    }
    if x[m1] < x[m0] {
        swap(x, inx, m1, m0);
    }
    // now x[m0] <= x[m1] <= x[m2]
}

fn swap_range(x: &mut [f64], inx: &mut [usize], a: usize, b: usize, n: usize) {
    for i in 0..n {
        swap(x, inx, a + i, b + i);
    }
}

fn do_pivot(x: &mut [f64], inx: &mut [usize], lo: usize, hi: usize) -> (usize, usize) {
    let m = lo + (hi - lo) / 2;
    if hi - lo > 40 {
        // Tukey's "ninther": median of three medians of three.
        let s = (hi - lo) / 8;
        median_of_three(x, inx, lo, lo + s, lo + 2 * s);
        median_of_three(x, inx, m, m - s, m + s);
        median_of_three(x, inx, hi - 1, hi - 1 - s, hi - 1 - 2 * s);
    }
    median_of_three(x, inx, lo, m, hi - 1);

    // Invariants are:
    //	x[lo] = pivot
    //	x[lo <= i < a] = pivot
    //	x[a <= i < b] < pivot
    //	x[b <= i < c] is unexamined
    //	x[c <= i < d] > pivot
    //	x[d <= i < hi] = pivot
    //
    // Once b meets c, the "= pivot" runs are swapped into the middle.
    let pivot = lo;
    let (mut a, mut b, mut c, mut d) = (lo + 1, lo + 1, hi, hi);
    loop {
        while b < c {
            if x[b] < x[pivot] {
                b += 1;
            } else if x[pivot] >= x[b] {
                // x[b] = pivot
                swap(x, inx, a, b);
                a += 1;
                b += 1;
            } else {
                break;
            }
        }
        while b < c {
            if x[pivot] < x[c - 1] {
                c -= 1;
            } else if x[c - 1] >= x[pivot] {
                // x[c-1] = pivot
                swap(x, inx, c - 1, d - 1);
                c -= 1;
                d -= 1;
            } else {
                break;
            }
        }
        if b >= c {
            break;
        }
        // x[b] > pivot; x[c-1] < pivot
        swap(x, inx, b, c - 1);
        b += 1;
        c -= 1;
    }

    let n = (b - a).min(a - lo);
    swap_range(x, inx, lo, b - n, n);

    let n = (hi - d).min(d - c);
    swap_range(x, inx, c, hi - n, n);

    (lo + b - a, hi - (d - c))
}

fn quick_sort(x: &mut [f64], inx: &mut [usize], mut a: usize, mut b: usize, mut max_depth: usize) {
    while b - a > 7 {
        if max_depth == 0 {
            heap_sort(x, inx, a, b);
            return;
        }
        max_depth -= 1;
        let (mlo, mhi) = do_pivot(x, inx, a, b);
        // Recursing only into the smaller half bounds the stack at lg(b-a).
        if mlo - a < b - mhi {
            quick_sort(x, inx, a, mlo, max_depth);
            a = mhi;
        } else {
            quick_sort(x, inx, mhi, b, max_depth);
            b = mlo;
        }
    }
    if b - a > 1 {
        insertion_sort(x, inx, a, b);
    }
}

/// Sort `values` into non-decreasing order, applying every swap to `indices`
/// as well.
///
/// The contents of `indices` are permuted, never rewritten: after the call,
/// `indices[i]` is the original index of the element now holding `values[i]`.
/// The sort is not stable.
///
/// # Panics
///
/// Panics in debug builds when the two slices differ in length.
pub fn dual_sort(values: &mut [f64], indices: &mut [usize]) {
    debug_assert_eq!(values.len(), indices.len());
    // Switch to heapsort once a depth of 2*ceil(lg(n+1)) is reached.
    let n = indices.len();
    let mut max_depth = 0;
    let mut i = n;
    while i > 0 {
        max_depth += 1;
        i >>= 1;
    }
    max_depth *= 2;
    quick_sort(values, indices, 0, n, max_depth);
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::dual_sort;

    /// Sorts and checks the two contract halves: keys non-decreasing, and the
    /// (key, index) pairing preserved from the input.
    fn check(mut values: Vec<f64>) {
        let original = values.clone();
        let mut indices: Vec<usize> = (0..values.len()).collect();
        dual_sort(&mut values, &mut indices);

        for w in values.windows(2) {
            assert!(w[0] <= w[1], "keys not sorted: {values:?}");
        }

        // indices is a permutation of 0..n
        let mut seen = vec![false; original.len()];
        for &i in &indices {
            assert!(!seen[i], "index {i} appears twice");
            seen[i] = true;
        }

        // each index still points at its original key
        for (pos, &i) in indices.iter().enumerate() {
            assert_eq!(values[pos].to_bits(), original[i].to_bits());
        }
    }

    #[test]
    fn empty_and_single() {
        check(vec![]);
        check(vec![42.0]);
    }

    #[test]
    fn short_run_insertion_path() {
        check(vec![3.0, 1.0, 2.0, 5.0, 4.0]);
    }

    #[test]
    fn already_sorted() {
        check((0..100).map(f64::from).collect());
    }

    #[test]
    fn reverse_sorted() {
        check((0..100).rev().map(f64::from).collect());
    }

    #[test]
    fn many_duplicates() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let values: Vec<f64> = (0..500).map(|_| f64::from(rng.gen_range(0..5))).collect();
        check(values);
    }

    #[test]
    fn random_large() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let values: Vec<f64> = (0..10_000).map(|_| rng.r#gen::<f64>()).collect();
        check(values);
    }

    #[test]
    fn indices_track_values() {
        let mut values = vec![0.9, 0.1, 0.5];
        let mut indices = vec![10, 20, 30];
        dual_sort(&mut values, &mut indices);
        assert_eq!(values, vec![0.1, 0.5, 0.9]);
        assert_eq!(indices, vec![20, 30, 10]);
    }
}
