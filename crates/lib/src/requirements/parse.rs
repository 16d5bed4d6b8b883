//! Line parser for `requirements.txt`.
//!
//! Accepts the subset of the pip requirements format that a reproducible
//! image needs: one requirement per line, optional extras, comma-separated
//! version specifiers, `name @ url` direct references, environment markers,
//! comments, and backslash continuations. Pip option lines (`-r`, `-e`,
//! `--index-url`, ...) are rejected: they pull inputs from outside the
//! manifest.

use std::collections::HashSet;

use super::types::{Operator, Requirement, RequirementsError, Specifier, normalize_name};

/// Parse manifest text into requirements.
///
/// Fails on the first malformed line, on duplicate packages, and when the
/// manifest lists nothing.
pub fn parse_requirements(text: &str) -> Result<Vec<Requirement>, RequirementsError> {
  let mut entries = Vec::new();
  let mut seen = HashSet::new();

  for (line, raw) in logical_lines(text) {
    let content = strip_comment(&raw).trim();
    if content.is_empty() {
      continue;
    }

    let malformed = |reason: &str| RequirementsError::Malformed {
      line,
      content: content.to_string(),
      reason: reason.to_string(),
    };

    let requirement = parse_line(content).map_err(|reason| malformed(&reason))?;

    if !seen.insert(requirement.normalized_name()) {
      return Err(malformed("duplicate requirement"));
    }
    entries.push(requirement);
  }

  if entries.is_empty() {
    return Err(RequirementsError::Empty);
  }

  Ok(entries)
}

/// Join backslash continuations, keeping the number of the first physical line.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
  let mut out = Vec::new();
  let mut current: Option<(usize, String)> = None;

  for (idx, physical) in text.lines().enumerate() {
    let (start, mut buf) = current.take().unwrap_or((idx + 1, String::new()));
    match physical.strip_suffix('\\') {
      Some(head) => {
        buf.push_str(head);
        current = Some((start, buf));
      }
      None => {
        buf.push_str(physical);
        out.push((start, buf));
      }
    }
  }

  if let Some(pending) = current {
    out.push(pending);
  }
  out
}

fn strip_comment(line: &str) -> &str {
  if line.trim_start().starts_with('#') {
    return "";
  }
  let cut = line
    .char_indices()
    .find(|&(i, c)| c == '#' && i > 0 && line[..i].ends_with(char::is_whitespace))
    .map(|(i, _)| i);
  match cut {
    Some(i) => &line[..i],
    None => line,
  }
}

fn parse_line(content: &str) -> Result<Requirement, String> {
  if content.starts_with('-') {
    return Err("pip options are not supported".to_string());
  }

  let (body, marker) = match content.split_once(';') {
    Some((body, marker)) => {
      let marker = marker.trim();
      if marker.is_empty() {
        return Err("empty environment marker".to_string());
      }
      (body.trim(), Some(marker.to_string()))
    }
    None => (content, None),
  };

  let (spec_part, url) = match body.split_once('@') {
    Some((head, url)) => {
      let url = url.trim();
      if !url.contains("://") {
        return Err("invalid direct reference".to_string());
      }
      (head.trim(), Some(url.to_string()))
    }
    None => (body, None),
  };

  let name_len = spec_part
    .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    .unwrap_or(spec_part.len());
  let name = &spec_part[..name_len];
  if !is_valid_name(name) {
    return Err("invalid package name".to_string());
  }

  let mut rest = spec_part[name_len..].trim_start();
  let mut extras = Vec::new();
  if let Some(after) = rest.strip_prefix('[') {
    let Some(close) = after.find(']') else {
      return Err("unterminated extras".to_string());
    };
    for extra in after[..close].split(',') {
      let extra = extra.trim();
      if !is_valid_name(extra) {
        return Err(format!("invalid extra '{}'", extra));
      }
      extras.push(normalize_name(extra));
    }
    rest = after[close + 1..].trim_start();
  }

  let specifiers = if rest.is_empty() {
    Vec::new()
  } else if url.is_some() {
    return Err("direct references cannot carry version specifiers".to_string());
  } else {
    parse_specifiers(rest)?
  };

  Ok(Requirement {
    name: name.to_string(),
    extras,
    specifiers,
    url,
    marker,
  })
}

fn parse_specifiers(text: &str) -> Result<Vec<Specifier>, String> {
  let text = text
    .strip_prefix('(')
    .and_then(|t| t.strip_suffix(')'))
    .unwrap_or(text);

  text
    .split(',')
    .map(|clause| {
      let clause = clause.trim();
      let op = Operator::PARSE_ORDER
        .into_iter()
        .find(|op| clause.starts_with(op.as_str()))
        .ok_or_else(|| format!("expected a version operator in '{}'", clause))?;
      let version = clause[op.as_str().len()..].trim();
      if version.is_empty() || !version.chars().all(is_version_char) {
        return Err(format!("invalid version '{}'", version));
      }
      Ok(Specifier {
        op,
        version: version.to_string(),
      })
    })
    .collect()
}

fn is_valid_name(name: &str) -> bool {
  let bytes = name.as_bytes();
  match (bytes.first(), bytes.last()) {
    (Some(first), Some(last)) => {
      first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
    _ => false,
  }
}

fn is_version_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '.' | '*' | '+' | '!' | '-' | '_')
}

#[cfg(test)]
mod tests {
  use super::*;

  fn names(entries: &[Requirement]) -> Vec<&str> {
    entries.iter().map(|r| r.name.as_str()).collect()
  }

  #[test]
  fn parses_pinned_and_ranged_requirements() {
    let entries = parse_requirements("fastapi==0.110.0\nuvicorn>=0.27,<1.0\npydantic\n").unwrap();

    assert_eq!(names(&entries), vec!["fastapi", "uvicorn", "pydantic"]);
    assert_eq!(entries[0].specifiers[0].op, Operator::Equal);
    assert_eq!(entries[1].specifiers.len(), 2);
    assert_eq!(entries[1].specifiers[0].op, Operator::GreaterEqual);
    assert_eq!(entries[1].specifiers[1].op, Operator::Less);
    assert!(entries[2].specifiers.is_empty());
  }

  #[test]
  fn skips_comments_and_blank_lines() {
    let text = "# header\n\nfastapi  # web framework\n   \n";
    let entries = parse_requirements(text).unwrap();
    assert_eq!(names(&entries), vec!["fastapi"]);
  }

  #[test]
  fn hash_inside_url_is_not_a_comment() {
    let entries = parse_requirements("pkg @ https://example.com/pkg.tar.gz#sha256=abc\n").unwrap();
    assert_eq!(entries[0].url.as_deref(), Some("https://example.com/pkg.tar.gz#sha256=abc"));
  }

  #[test]
  fn parses_extras_and_markers() {
    let entries = parse_requirements("uvicorn[standard, Watch_Files]>=0.27 ; python_version >= '3.9'\n").unwrap();
    let req = &entries[0];
    assert_eq!(req.extras, vec!["standard", "watch-files"]);
    assert_eq!(req.marker.as_deref(), Some("python_version >= '3.9'"));
    assert_eq!(req.to_string(), "uvicorn[standard,watch-files]>=0.27; python_version >= '3.9'");
  }

  #[test]
  fn joins_continuation_lines() {
    let entries = parse_requirements("anthropic\\\n>=0.20\nhttpx\n").unwrap();
    assert_eq!(entries[0].to_string(), "anthropic>=0.20");
    assert_eq!(names(&entries), vec!["anthropic", "httpx"]);
  }

  #[test]
  fn empty_manifest_is_rejected() {
    assert!(matches!(parse_requirements(""), Err(RequirementsError::Empty)));
    assert!(matches!(
      parse_requirements("# only comments\n\n"),
      Err(RequirementsError::Empty)
    ));
  }

  #[test]
  fn option_lines_are_rejected_with_line_number() {
    let err = parse_requirements("fastapi\n-r other.txt\n").unwrap_err();
    match err {
      RequirementsError::Malformed { line, reason, .. } => {
        assert_eq!(line, 2);
        assert!(reason.contains("options"));
      }
      other => panic!("expected Malformed, got {:?}", other),
    }
  }

  #[test]
  fn bad_operator_is_rejected() {
    let err = parse_requirements("fastapi=>1.0\n").unwrap_err();
    assert!(matches!(err, RequirementsError::Malformed { line: 1, .. }));
  }

  #[test]
  fn invalid_names_are_rejected() {
    for line in ["-fastapi", "fast api==1", "[extra]", "pkg[", "pkg==", "_pkg"] {
      assert!(parse_requirements(line).is_err(), "expected '{}' to be rejected", line);
    }
  }

  #[test]
  fn duplicates_are_detected_after_normalization() {
    let err = parse_requirements("python-dotenv\nPython_Dotenv==1.0\n").unwrap_err();
    match err {
      RequirementsError::Malformed { line, reason, .. } => {
        assert_eq!(line, 2);
        assert_eq!(reason, "duplicate requirement");
      }
      other => panic!("expected Malformed, got {:?}", other),
    }
  }

  #[test]
  fn direct_reference_rejects_specifiers_and_bad_urls() {
    assert!(parse_requirements("pkg @ not-a-url\n").is_err());
    assert!(parse_requirements("pkg==1.0 @ https://example.com/p.whl\n").is_err());
  }

  #[test]
  fn parenthesized_specifiers_are_accepted() {
    let entries = parse_requirements("requests (>=2.31, !=2.32.0)\n").unwrap();
    assert_eq!(entries[0].to_string(), "requests>=2.31,!=2.32.0");
  }
}
