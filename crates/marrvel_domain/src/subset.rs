use std::collections::BTreeSet;

use crate::Error;

/// Parses a 1-based selection such as `1-3,5,7-9` into sorted, deduplicated
/// 0-based indices below `total`.
pub fn parse_subset(subset: &str, total: usize) -> crate::Result<Vec<usize>> {
    let mut indices = BTreeSet::new();

    for part in subset.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_index(start, total)?;
                let end = parse_index(end, total)?;
                if start > end {
                    return Err(Error::InvalidRange(start, end));
                }
                indices.extend(start - 1..end);
            }
            None => {
                indices.insert(parse_index(part, total)? - 1);
            }
        }
    }

    Ok(indices.into_iter().collect())
}

fn parse_index(value: &str, total: usize) -> crate::Result<usize> {
    let value = value.trim();
    let index: usize = value
        .parse()
        .map_err(|_| Error::InvalidIndex(value.to_string()))?;
    if index < 1 {
        return Err(Error::IndexTooSmall);
    }
    if index > total {
        return Err(Error::IndexOutOfRange(index));
    }
    Ok(index)
}
