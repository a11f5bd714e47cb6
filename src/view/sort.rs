use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use crate::tree::node::NodeKind;

/// Case-insensitive comparison that orders digit runs by numeric value
/// (`file2` before `file10`). Names equal under that rule fall back to a
/// plain byte comparison so the order stays total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        let (x, y) = match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => (x, y),
        };

        if x.is_ascii_digit() && y.is_ascii_digit() {
            let l = take_digits(&mut left);
            let r = take_digits(&mut right);
            let ord = cmp_digits(&l, &r);
            if ord != Ordering::Equal {
                return ord;
            }
            continue;
        }

        let ord = x.to_lowercase().cmp(y.to_lowercase());
        if ord != Ordering::Equal {
            return ord;
        }
        left.next();
        right.next();
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Folders before files, then [`natural_cmp`] on the name.
pub fn listing_cmp(a_kind: NodeKind, a_name: &str, b_kind: NodeKind, b_name: &str) -> Ordering {
    b_kind
        .is_folder()
        .cmp(&a_kind.is_folder())
        .then_with(|| natural_cmp(a_name, b_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut names: Vec<&str>) -> Vec<&str> {
        names.sort_by(|a, b| natural_cmp(a, b));
        names
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(sorted(vec!["b.txt", "A.txt", "a2.txt"]), vec!["A.txt", "a2.txt", "b.txt"]);
    }

    #[test]
    fn numeric_runs_compare_by_value() {
        assert_eq!(
            sorted(vec!["file10.pdf", "file2.pdf", "file1.pdf"]),
            vec!["file1.pdf", "file2.pdf", "file10.pdf"]
        );
    }

    #[test]
    fn leading_zeros_do_not_change_value() {
        assert_eq!(natural_cmp("v007", "v7"), "v007".cmp("v7"));
        assert_eq!(natural_cmp("v007", "v8"), Ordering::Less);
    }

    #[test]
    fn prefix_sorts_first() {
        assert_eq!(natural_cmp("report", "report-final"), Ordering::Less);
    }

    #[test]
    fn folders_first_then_name() {
        let mut items = vec![
            (NodeKind::File, "b.txt"),
            (NodeKind::Folder, "A_folder"),
            (NodeKind::File, "a.txt"),
            (NodeKind::Folder, "B_folder"),
        ];
        items.sort_by(|a, b| listing_cmp(a.0, a.1, b.0, b.1));
        let names: Vec<&str> = items.iter().map(|(_, n)| *n).collect();
        assert_eq!(names, vec!["A_folder", "B_folder", "a.txt", "b.txt"]);
    }
}
