//! Small helpers shared by the generator and the matcher.

/// Replaces `{key}` occurrences in the template with the provided values.
/// No nesting or conditionals.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    out = out.replace(&format!("{{{}}}", k), v);
  }
  out
}

/// Option label for a zero-based position: 0 -> "A", 1 -> "B", ...
pub fn option_label(index: usize) -> String {
  let letter = (b'A' + (index % 26) as u8) as char;
  letter.to_string()
}

/// Position of an option label ("b", " C ", "D)") within `len` options.
pub fn label_index(label: &str, len: usize) -> Option<usize> {
  let trimmed = label.trim().trim_end_matches(&[')', '.', ':'][..]).trim();
  let mut chars = trimmed.chars();
  let c = chars.next()?.to_ascii_uppercase();
  if chars.next().is_some() || !c.is_ascii_uppercase() {
    return None;
  }
  let idx = (c as u8 - b'A') as usize;
  (idx < len).then_some(idx)
}

/// Case-insensitive comparison ignoring surrounding and repeated whitespace.
pub fn same_text(a: &str, b: &str) -> bool {
  let norm = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
  norm(a) == norm(b)
}

/// Log-safe truncation for large strings, on a char boundary.
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  if s.chars().count() <= max_chars {
    s.to_string()
  } else {
    format!("{}… ({} bytes total)", s.chars().take(max_chars).collect::<String>(), s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_round_trip_positions() {
    assert_eq!(option_label(0), "A");
    assert_eq!(option_label(4), "E");
    assert_eq!(label_index(" c ", 4), Some(2));
    assert_eq!(label_index("B)", 4), Some(1));
    assert_eq!(label_index("E", 4), None);
    assert_eq!(label_index("AB", 4), None);
    assert_eq!(label_index("", 4), None);
  }

  #[test]
  fn template_and_text_helpers() {
    assert_eq!(fill_template("{a}-{b}-{a}", &[("a", "x"), ("b", "y")]), "x-y-x");
    assert!(same_text("  Due  process ", "due process"));
    assert_eq!(trunc_for_log("ação penal", 4), "ação… (12 bytes total)");
  }
}
