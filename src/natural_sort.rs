//! Natural-sort comparison for chamfer input filenames, so `out_2.png` sorts
//! before `out_10.png`. Chunks the name
//! into alternating numeric and non-numeric runs and compares numeric chunks
//! by integer value.

use std::cmp::Ordering;

fn chunks(s: &str) -> Vec<(bool, &str)> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let is_digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == is_digit {
            end += 1;
        }
        out.push((is_digit, &s[start..end]));
        start = end;
    }
    out
}

pub fn compare(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x.0, y.0) {
            (true, true) => {
                let (na, nb) = (x.1.parse::<u128>(), y.1.parse::<u128>());
                match (na, nb) {
                    (Ok(na), Ok(nb)) => na.cmp(&nb),
                    _ => x.1.cmp(y.1),
                }
            }
            _ => x.1.cmp(y.1),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}
