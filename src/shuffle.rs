//! Shuffle-and-sort: for one reduce partition, turn `N` already
//! locally-sorted map-output files into a single key-sorted stream of
//! `(key, [values...])`, ready for reducer consumption.

use std::fs;
use std::io::Write;
use std::path::Path;

use rayon::slice::ParallelSliceMut;
use tracing::warn;

use crate::error::Result;
use crate::model::KeyValue;

/// Reads every input file (missing files are a warning, not an
/// error — treated as empty), sorts all records by key with a stable
/// comparison, groups consecutive equal keys, and writes
/// `<key>\t<v1>,<v2>,...\n` lines to `output_file` in non-decreasing
/// key order.
///
/// Value order within a group preserves the order `input_files` were
/// given in, i.e. the coordinator-provided concatenation order.
pub fn shuffle_and_sort(input_files: &[String], partition_id: u32, output_file: &str) -> Result<()> {
    let mut all_kvs: Vec<KeyValue> = Vec::new();

    for path in input_files {
        if !Path::new(path).exists() {
            warn!(partition_id, file = %path, "intermediate file missing for shuffle, treating as empty");
            continue;
        }
        let contents = fs::read_to_string(path)?;
        for line in contents.lines() {
            if let Some(kv) = KeyValue::parse_line(line) {
                all_kvs.push(kv);
            }
        }
    }

    // Stable sort by key so within-key value order is preserved.
    all_kvs.par_sort_by(|a, b| a.key.cmp(&b.key));

    if let Some(parent) = Path::new(output_file).parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = fs::File::create(output_file)?;

    let mut iter = all_kvs.into_iter().peekable();
    while let Some(first) = iter.next() {
        let key = first.key.clone();
        let mut values = vec![first.value];
        while let Some(next) = iter.peek() {
            if next.key != key {
                break;
            }
            values.push(iter.next().unwrap().value);
        }
        writeln!(out, "{}\t{}", key, values.join(","))?;
    }

    Ok(())
}

/// Reads a shuffled file back as `(key, values)` pairs in file order
/// (already key-sorted by construction).
pub fn read_shuffled_file(path: &str) -> Result<Vec<(String, Vec<String>)>> {
    if !Path::new(path).exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)?;
    let mut out = Vec::new();
    for line in contents.lines() {
        if let Some((key, values_str)) = line.split_once('\t') {
            let values = if values_str.is_empty() {
                Vec::new()
            } else {
                values_str.split(',').map(str::to_string).collect()
            };
            out.push((key.to_string(), values));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, lines: &[(&str, &str)]) -> String {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        for (k, v) in lines {
            writeln!(f, "{k}\t{v}").unwrap();
        }
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn groups_and_sorts_keys() {
        let dir = tempdir().unwrap();
        let f1 = write_file(dir.path(), "a.txt", &[("b", "1"), ("a", "1")]);
        let f2 = write_file(dir.path(), "b.txt", &[("a", "1"), ("c", "1")]);
        let out = dir.path().join("shuffled_part_0.txt");

        shuffle_and_sort(&[f1, f2], 0, out.to_str().unwrap()).unwrap();

        let result = read_shuffled_file(out.to_str().unwrap()).unwrap();
        let keys: Vec<_> = result.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        let a_values = &result.iter().find(|(k, _)| k == "a").unwrap().1;
        assert_eq!(a_values, &vec!["1".to_string(), "1".to_string()]);
    }

    #[test]
    fn missing_file_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("shuffled_part_1.txt");
        shuffle_and_sort(&["/no/such/file.txt".to_string()], 1, out.to_str().unwrap()).unwrap();
        let result = read_shuffled_file(out.to_str().unwrap()).unwrap();
        assert!(result.is_empty());
    }
}
