//! Line-level autofix rewriter
//!
//! A pure function over `(line, variable)`: wraps the variable reference with
//! the HTML-escape call when a safe, syntactically plausible rewrite exists,
//! and returns the line untouched otherwise. Works on raw line text so the
//! suggested fix preserves the author's formatting; context decisions stay
//! with the AST side and meet this code only through the aggregator.

use crate::context;
use crate::taint::SanitizerRegistry;

#[derive(Debug, Clone)]
pub struct Rewriter {
    escape: String,
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Rewriter {
    pub fn new() -> Self {
        Self::with_sanitizers(&SanitizerRegistry::with_defaults())
    }

    pub fn with_sanitizers(sanitizers: &SanitizerRegistry) -> Self {
        Self {
            escape: sanitizers.escape_function().to_string(),
        }
    }

    fn wrap(&self, expr: &str) -> String {
        format!("{}({})", self.escape, expr)
    }

    /// Rewrites one variable on one line, or returns the line unchanged.
    pub fn rewrite(&self, line: &str, var: &str) -> String {
        let occurrences = occurrences(line, var);
        if occurrences.is_empty() {
            return line.to_string();
        }

        // refusal preconditions, in order
        if context::all_in_param_context(line, &occurrences) {
            return line.to_string();
        }
        let bind_spans = [call_spans(line, "bind_param"), call_spans(line, "bindparam")].concat();
        if occurrences.iter().any(|&o| in_any_call(&bind_spans, o)) {
            return line.to_string();
        }
        let ref_spans = [
            call_spans(line, "isset"),
            call_spans(line, "empty"),
            call_spans(line, "unset"),
        ]
        .concat();
        if occurrences.iter().any(|&o| in_any_call(&ref_spans, o)) {
            return line.to_string();
        }
        let escape_spans = call_spans(line, &self.escape);
        if occurrences.iter().all(|&o| in_any_call(&escape_spans, o)) {
            return line.to_string();
        }

        // `<?= ... ?>` spans are code islands inside markup; only in-place
        // wrapping is valid there
        if line.contains("<?=") {
            return self.rewrite_short_echo(line, var);
        }

        type Strategy = fn(&Rewriter, &str, &str) -> String;

        if let Some((op_start, op_end)) = find_assignment(line) {
            let (lhs, rhs) = (&line[..op_start], &line[op_end..]);
            let operator = &line[op_start..op_end];
            let strategies: [Strategy; 4] = [
                Self::assoc_element,
                Self::rhs_transform,
                Self::string_splice,
                Self::attribute_splice,
            ];
            for strategy in strategies {
                let candidate = strategy(self, rhs, var);
                if candidate != rhs {
                    return format!("{}{}{}", lhs, operator, candidate);
                }
            }
            return line.to_string();
        }

        let strategies: [Strategy; 7] = [
            Self::assoc_element,
            Self::implode_wrap,
            Self::indexed_wrap,
            Self::output_tail,
            Self::string_splice,
            Self::attribute_splice,
            Self::standalone_replace,
        ];
        for strategy in strategies {
            let candidate = strategy(self, line, var);
            if candidate != line {
                return candidate;
            }
        }
        line.to_string()
    }

    /// Wraps references inside each `<?= ... ?>` region in place: standalone
    /// tokens and indexed chains both stay inside the code island.
    fn rewrite_short_echo(&self, line: &str, var: &str) -> String {
        let mut text = line.to_string();
        loop {
            let mut changed = false;
            let escape_spans = call_spans(&text, &self.escape);
            let regions = short_echo_regions(&text);
            for &occ in occurrences(&text, var).iter() {
                if !regions.iter().any(|&(s, e)| occ > s && occ < e) {
                    continue;
                }
                if in_any_call(&escape_spans, occ) {
                    continue;
                }
                let end = if let Some(end) = indexed_span_end(&text, occ, var) {
                    end
                } else if is_standalone(&text, occ, var) {
                    occ + 1 + var.len()
                } else {
                    continue;
                };
                let wrapped = self.wrap(&text[occ..end]);
                text.replace_range(occ..end, &wrapped);
                changed = true;
                break;
            }
            if !changed {
                return text;
            }
        }
    }

    /// `'key' => $var` followed by a terminator: wrap just the reference.
    fn assoc_element(&self, text: &str, var: &str) -> String {
        let mut out = text.to_string();
        let string_spans = string_spans(text);
        let escape_spans = call_spans(text, &self.escape);
        for &occ in occurrences(text, var).iter().rev() {
            if in_string(&string_spans, occ) || in_any_call(&escape_spans, occ) {
                continue;
            }
            let bytes = text.as_bytes();
            let mut before = occ;
            while before > 0 && (bytes[before - 1] == b' ' || bytes[before - 1] == b'\t') {
                before -= 1;
            }
            if before < 2 || &text[before - 2..before] != "=>" {
                continue;
            }
            let end = occ + 1 + var.len();
            let mut after = end;
            while after < bytes.len() && (bytes[after] == b' ' || bytes[after] == b'\t') {
                after += 1;
            }
            let terminated = after >= bytes.len()
                || matches!(bytes[after], b',' | b']' | b')' | b';');
            if !terminated {
                continue;
            }
            let wrapped = self.wrap(&text[occ..end]);
            out.replace_range(occ..end, &wrapped);
        }
        out
    }

    /// The RHS composition: wrap `implode(...)`, wrap indexed reads, then
    /// replace remaining standalone references.
    fn rhs_transform(&self, text: &str, var: &str) -> String {
        let mut out = self.implode_wrap(text, var);
        out = self.indexed_wrap(&out, var);
        self.standalone_replace(&out, var)
    }

    /// Wraps a whole `implode(...)` call that carries the variable.
    /// Leftmost-first with a rescan after each change, so nested calls end
    /// up inside a single wrapper.
    fn implode_wrap(&self, text: &str, var: &str) -> String {
        let mut out = text.to_string();
        loop {
            let escape_spans = call_spans(&out, &self.escape);
            let var_offsets = occurrences(&out, var);
            let mut changed = false;
            for (name_start, _open, close) in full_call_spans(&out, "implode") {
                if close >= out.len() {
                    continue; // unbalanced call, leave the line alone
                }
                let involves = var_offsets.iter().any(|&o| o > name_start && o < close);
                if !involves || in_any_call(&escape_spans, name_start) {
                    continue;
                }
                let wrapped = self.wrap(&out[name_start..=close]);
                out.replace_range(name_start..=close, &wrapped);
                changed = true;
                break;
            }
            if !changed {
                return out;
            }
        }
    }

    /// Wraps `$var[...]` chains whole, leftmost-first with a rescan so a
    /// chain nested in another chain is only wrapped once.
    fn indexed_wrap(&self, text: &str, var: &str) -> String {
        let mut out = text.to_string();
        loop {
            let string_spans = string_spans(&out);
            let escape_spans = call_spans(&out, &self.escape);
            let mut changed = false;
            for &occ in occurrences(&out, var).iter() {
                if in_string(&string_spans, occ) || in_any_call(&escape_spans, occ) {
                    continue;
                }
                let Some(end) = indexed_span_end(&out, occ, var) else {
                    continue;
                };
                let wrapped = self.wrap(&out[occ..end]);
                out.replace_range(occ..end, &wrapped);
                changed = true;
                break;
            }
            if !changed {
                return out;
            }
        }
    }

    /// `echo`/`print` statements: wrap standalone references in the tail.
    fn output_tail(&self, text: &str, var: &str) -> String {
        let trimmed = text.trim_start();
        let indent = text.len() - trimmed.len();
        let lower = trimmed.to_ascii_lowercase();
        let tail_start = if starts_with_keyword(&lower, "echo") {
            indent + 4
        } else if starts_with_keyword(&lower, "print") {
            indent + 5
        } else {
            return text.to_string();
        };
        let mut out = text.to_string();
        let string_spans = string_spans(text);
        let escape_spans = call_spans(text, &self.escape);
        for &occ in occurrences(text, var).iter().rev() {
            if occ < tail_start
                || in_string(&string_spans, occ)
                || in_any_call(&escape_spans, occ)
                || !is_standalone(text, occ, var)
            {
                continue;
            }
            let end = occ + 1 + var.len();
            let wrapped = self.wrap(&out[occ..end]);
            out.replace_range(occ..end, &wrapped);
        }
        out
    }

    /// Splices a quoted string around the variable:
    /// `"a $var b"` becomes `"a " . htmlspecialchars($var) . " b"`.
    fn string_splice(&self, text: &str, var: &str) -> String {
        let mut out = text.to_string();
        let string_spans = string_spans(text);
        let escape_spans = call_spans(text, &self.escape);
        for &occ in occurrences(text, var).iter().rev() {
            let Some(&(_, _, quote)) = string_spans
                .iter()
                .find(|&&(s, e, _)| occ > s && occ + 1 + var.len() < e)
            else {
                continue;
            };
            if in_any_call(&escape_spans, occ) || !is_standalone(text, occ, var) {
                continue;
            }
            let token_end = occ + 1 + var.len();
            let quote = quote as char;
            let spliced = format!(
                "{} . {} . {}",
                quote,
                self.wrap(&out[occ..token_end]),
                quote
            );
            out.replace_range(occ..token_end, &spliced);
        }
        out
    }

    /// HTML attribute values in markup text: `value="...$var..."`.
    fn attribute_splice(&self, text: &str, var: &str) -> String {
        let mut out = text.to_string();
        let escape_spans = call_spans(text, &self.escape);
        for (attr_start, attr_end) in attribute_value_spans(text).into_iter().rev() {
            for &occ in occurrences(text, var).iter().rev() {
                if occ <= attr_start || occ + 1 + var.len() >= attr_end {
                    continue;
                }
                if in_any_call(&escape_spans, occ) || !is_standalone(text, occ, var) {
                    continue;
                }
                let token_end = occ + 1 + var.len();
                let spliced = format!("\" . {} . \"", self.wrap(&out[occ..token_end]));
                out.replace_range(occ..token_end, &spliced);
            }
        }
        out
    }

    /// Fallback: wrap every standalone reference outside strings.
    fn standalone_replace(&self, text: &str, var: &str) -> String {
        let mut out = text.to_string();
        let string_spans = string_spans(text);
        let escape_spans = call_spans(text, &self.escape);
        for &occ in occurrences(text, var).iter().rev() {
            if in_string(&string_spans, occ)
                || in_any_call(&escape_spans, occ)
                || !is_standalone(text, occ, var)
            {
                continue;
            }
            let end = occ + 1 + var.len();
            let wrapped = self.wrap(&out[occ..end]);
            out.replace_range(occ..end, &wrapped);
        }
        out
    }
}

/// Any occurrence of the variable already wrapped by the escape function.
pub fn is_escaped_on_line(line: &str, var: &str, sanitizers: &SanitizerRegistry) -> bool {
    let spans = call_spans(line, sanitizers.escape_function());
    occurrences(line, var)
        .iter()
        .any(|&o| in_any_call(&spans, o))
}

/// Whether the variable appears as `$var[` anywhere on the line.
pub fn has_indexed_occurrence(line: &str, var: &str) -> bool {
    let bytes = line.as_bytes();
    occurrences(line, var).iter().any(|&o| {
        let end = o + 1 + var.len();
        end < bytes.len() && bytes[end] == b'['
    })
}

/// Whether the variable appears inside an `implode(...)` call on the line.
pub fn in_implode_call(line: &str, var: &str) -> bool {
    let spans = call_spans(line, "implode");
    occurrences(line, var)
        .iter()
        .any(|&o| in_any_call(&spans, o))
}

/// Byte offsets of `$var` references with an exact name match.
pub fn occurrences(line: &str, var: &str) -> Vec<usize> {
    let bytes = line.as_bytes();
    let name = var.as_bytes();
    let mut out = Vec::new();
    if name.is_empty() {
        return out;
    }
    let mut i = 0;
    while i + 1 + name.len() <= bytes.len() {
        if bytes[i] == b'$' && &bytes[i + 1..i + 1 + name.len()] == name {
            let end = i + 1 + name.len();
            if end >= bytes.len() || !is_word_byte(bytes[end]) {
                out.push(i);
            }
        }
        i += 1;
    }
    out
}

/// A reference is standalone when nothing chains off it: no index, no
/// property access, no longer identifier.
fn is_standalone(line: &str, occ: usize, var: &str) -> bool {
    let bytes = line.as_bytes();
    let end = occ + 1 + var.len();
    if end >= bytes.len() {
        return true;
    }
    if is_word_byte(bytes[end]) || bytes[end] == b'[' {
        return false;
    }
    !(bytes[end] == b'-' && end + 1 < bytes.len() && bytes[end + 1] == b'>')
}

/// End offset of an `$var[...]...[...]` chain, or None when not indexed.
fn indexed_span_end(line: &str, occ: usize, var: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut end = occ + 1 + var.len();
    if end >= bytes.len() || bytes[end] != b'[' {
        return None;
    }
    while end < bytes.len() && bytes[end] == b'[' {
        end = matching_bracket(bytes, end)? + 1;
    }
    Some(end)
}

/// Quoted spans `(start, end_exclusive, quote_byte)`, quotes included.
fn string_spans(line: &str) -> Vec<(usize, usize, u8)> {
    let bytes = line.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        if byte == b'\'' || byte == b'"' {
            let start = i;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\\' {
                    i += 2;
                    continue;
                }
                if bytes[i] == byte {
                    i += 1;
                    break;
                }
                i += 1;
            }
            spans.push((start, i.min(bytes.len()), byte));
            continue;
        }
        i += 1;
    }
    spans
}

fn in_string(spans: &[(usize, usize, u8)], offset: usize) -> bool {
    spans
        .iter()
        .any(|&(start, end, _)| offset > start && offset < end.saturating_sub(1))
}

/// Argument spans `(open_paren, close_paren)` of calls to `name`,
/// case-insensitive, skipping names inside string literals.
fn call_spans(line: &str, name: &str) -> Vec<(usize, usize)> {
    full_call_spans(line, name)
        .into_iter()
        .map(|(_, open, close)| (open, close))
        .collect()
}

/// Like `call_spans` but also reports where the callee name starts.
fn full_call_spans(line: &str, name: &str) -> Vec<(usize, usize, usize)> {
    let bytes = line.as_bytes();
    let lower = line.to_ascii_lowercase();
    let needle = name.to_ascii_lowercase();
    let strings = string_spans(line);
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(found) = lower[from..].find(&needle) {
        let start = from + found;
        from = start + 1;
        if start > 0 && (is_word_byte(bytes[start - 1]) || bytes[start - 1] == b'$') {
            continue;
        }
        if strings.iter().any(|&(s, e, _)| start > s && start < e) {
            continue;
        }
        let mut j = start + needle.len();
        while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'(' {
            continue;
        }
        let close = matching_paren(bytes, j).unwrap_or(bytes.len());
        out.push((start, j, close));
    }
    out
}

fn in_any_call(spans: &[(usize, usize)], offset: usize) -> bool {
    spans
        .iter()
        .any(|&(open, close)| offset > open && offset < close)
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    matching_delim(bytes, open, b'(', b')')
}

fn matching_bracket(bytes: &[u8], open: usize) -> Option<usize> {
    matching_delim(bytes, open, b'[', b']')
}

fn matching_delim(bytes: &[u8], open: usize, open_byte: u8, close_byte: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let byte = bytes[i];
        match quote {
            Some(q) => {
                if byte == b'\\' {
                    i += 2;
                    continue;
                }
                if byte == q {
                    quote = None;
                }
            }
            None => {
                if byte == b'\'' || byte == b'"' {
                    quote = Some(byte);
                } else if byte == open_byte {
                    depth += 1;
                } else if byte == close_byte {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
            }
        }
        i += 1;
    }
    None
}

/// Spans of `<?= ... ?>` regions; an unterminated region runs to the end.
fn short_echo_regions(line: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(found) = line[from..].find("<?=") {
        let start = from + found;
        let end = match line[start..].find("?>") {
            Some(close) => start + close,
            None => line.len(),
        };
        out.push((start, end));
        from = end.max(start + 3);
    }
    out
}

/// Double-quoted HTML attribute value spans for value/placeholder/title.
fn attribute_value_spans(line: &str) -> Vec<(usize, usize)> {
    let lower = line.to_ascii_lowercase();
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    for attr in ["value", "placeholder", "title"] {
        let mut from = 0;
        while let Some(found) = lower[from..].find(attr) {
            let start = from + found;
            from = start + 1;
            if start > 0 && is_word_byte(bytes[start - 1]) {
                continue;
            }
            let mut j = start + attr.len();
            while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
                j += 1;
            }
            if j >= bytes.len() || bytes[j] != b'=' {
                continue;
            }
            j += 1;
            while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
                j += 1;
            }
            if j >= bytes.len() || bytes[j] != b'"' {
                continue;
            }
            let open = j;
            let close = match line[open + 1..].find('"') {
                Some(c) => open + 1 + c,
                None => continue,
            };
            out.push((open, close));
        }
    }
    out.sort_unstable();
    out
}

fn starts_with_keyword(lower_text: &str, keyword: &str) -> bool {
    lower_text.starts_with(keyword)
        && lower_text[keyword.len()..]
            .bytes()
            .next()
            .map(|b| !is_word_byte(b))
            .unwrap_or(true)
}

/// Byte span of the first top-level assignment operator, outside strings
/// and outside parentheses or brackets.
fn find_assignment(line: &str) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        match quote {
            Some(q) => {
                if byte == b'\\' {
                    i += 2;
                    continue;
                }
                if byte == q {
                    quote = None;
                }
            }
            None => match byte {
                b'\'' | b'"' => quote = Some(byte),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                b'=' if depth == 0 => {
                    let next = bytes.get(i + 1).copied();
                    let prev = if i > 0 { Some(bytes[i - 1]) } else { None };
                    if next == Some(b'=') || next == Some(b'>') {
                        i += 2;
                        continue;
                    }
                    if matches!(prev, Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>')) {
                        i += 1;
                        continue;
                    }
                    if matches!(
                        prev,
                        Some(b'+') | Some(b'-') | Some(b'*') | Some(b'/') | Some(b'.')
                    ) {
                        return Some((i - 1, i + 1));
                    }
                    return Some((i, i + 1));
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(line: &str, var: &str) -> String {
        Rewriter::new().rewrite(line, var)
    }

    #[test]
    fn wraps_echoed_variable() {
        assert_eq!(
            rewrite("echo $name;", "name"),
            "echo htmlspecialchars($name);"
        );
    }

    #[test]
    fn wraps_printed_variable() {
        assert_eq!(
            rewrite("print $title;", "title"),
            "print htmlspecialchars($title);"
        );
    }

    #[test]
    fn leaves_unrelated_lines_alone() {
        assert_eq!(rewrite("echo $other;", "name"), "echo $other;");
    }

    #[test]
    fn splices_interpolated_string() {
        assert_eq!(
            rewrite(r#"echo "<p>value: $val</p>";"#, "val"),
            r#"echo "<p>value: " . htmlspecialchars($val) . "</p>";"#
        );
    }

    #[test]
    fn splices_string_on_assignment_rhs() {
        assert_eq!(
            rewrite(r#"$html = "<b>$who</b>";"#, "who"),
            r#"$html = "<b>" . htmlspecialchars($who) . "</b>";"#
        );
    }

    #[test]
    fn rewrites_assignment_rhs_only() {
        assert_eq!(
            rewrite("$out = $name;", "name"),
            "$out = htmlspecialchars($name);"
        );
    }

    #[test]
    fn self_assignment_touches_rhs_only() {
        assert_eq!(
            rewrite("$name = trim($name);", "name"),
            "$name = trim(htmlspecialchars($name));"
        );
    }

    #[test]
    fn concat_assignment_rhs_is_rewritten() {
        assert_eq!(
            rewrite("$out .= $chunk;", "chunk"),
            "$out .= htmlspecialchars($chunk);"
        );
    }

    #[test]
    fn wraps_indexed_reference() {
        assert_eq!(
            rewrite("echo $row['name'];", "row"),
            "echo htmlspecialchars($row['name']);"
        );
    }

    #[test]
    fn wraps_chained_index_reference() {
        assert_eq!(
            rewrite("echo $data['a']['b'];", "data"),
            "echo htmlspecialchars($data['a']['b']);"
        );
    }

    #[test]
    fn wraps_whole_implode_call() {
        assert_eq!(
            rewrite("echo implode(', ', $tags);", "tags"),
            "echo htmlspecialchars(implode(', ', $tags));"
        );
    }

    #[test]
    fn wraps_associative_array_element() {
        assert_eq!(
            rewrite("'name' => $name,", "name"),
            "'name' => htmlspecialchars($name),"
        );
    }

    #[test]
    fn wraps_short_echo_variable() {
        assert_eq!(
            rewrite("<?= $title ?>", "title"),
            "<?= htmlspecialchars($title) ?>"
        );
    }

    #[test]
    fn short_echo_inside_attribute_keeps_code_context() {
        assert_eq!(
            rewrite(r#"value="<?= $v ?>""#, "v"),
            r#"value="<?= htmlspecialchars($v) ?>""#
        );
    }

    #[test]
    fn refuses_parameter_declarations() {
        let line = "function greet($name) {";
        assert_eq!(rewrite(line, "name"), line);
    }

    #[test]
    fn refuses_bind_param_arguments() {
        let line = "$stmt->bind_param('s', $id);";
        assert_eq!(rewrite(line, "id"), line);
    }

    #[test]
    fn refuses_isset_empty_unset() {
        for line in [
            "if (isset($x)) {",
            "if (empty($x)) {",
            "unset($x);",
            "if (isset($x['k'])) {",
        ] {
            assert_eq!(rewrite(line, "x"), line, "line: {}", line);
        }
    }

    #[test]
    fn refuses_already_escaped_reference() {
        let line = "echo htmlspecialchars($name);";
        assert_eq!(rewrite(line, "name"), line);
    }

    #[test]
    fn property_access_is_not_standalone() {
        let line = "echo $user->name;";
        assert_eq!(rewrite(line, "user"), line);
    }

    #[test]
    fn rewriter_is_idempotent() {
        let cases = [
            ("echo $name;", "name"),
            (r#"echo "<p>value: $val</p>";"#, "val"),
            ("$out = $name;", "name"),
            ("echo $row['name'];", "row"),
            ("echo implode(', ', $tags);", "tags"),
            ("'name' => $name,", "name"),
            ("<?= $title ?>", "title"),
            ("$name = trim($name);", "name"),
        ];
        for (line, var) in cases {
            let once = rewrite(line, var);
            let twice = rewrite(&once, var);
            assert_eq!(once, twice, "not idempotent for {}", line);
        }
    }

    #[test]
    fn multiple_occurrences_all_wrapped_in_echo_tail() {
        assert_eq!(
            rewrite("echo $a . ' and ' . $a;", "a"),
            "echo htmlspecialchars($a) . ' and ' . htmlspecialchars($a);"
        );
    }

    #[test]
    fn variable_name_prefix_does_not_match() {
        assert_eq!(rewrite("echo $names;", "name"), "echo $names;");
    }

    #[test]
    fn occurrences_ignore_longer_names() {
        assert_eq!(occurrences("echo $names . $name;", "name"), vec![14]);
    }

    #[test]
    fn assignment_detection_skips_comparisons() {
        assert!(find_assignment("if ($a == $b) {").is_none());
        assert!(find_assignment("$a == $b;").is_none());
        assert!(find_assignment("'k' => $v,").is_none());
        assert_eq!(find_assignment("$a = $b;"), Some((3, 4)));
        assert_eq!(find_assignment("$a .= $b;"), Some((3, 5)));
    }

    #[test]
    fn assignment_inside_parens_is_not_top_level() {
        assert!(find_assignment("foo($a = 1);").is_none());
    }

    #[test]
    fn escaped_detection_helper() {
        let sanitizers = SanitizerRegistry::with_defaults();
        assert!(is_escaped_on_line(
            "echo htmlspecialchars($x);",
            "x",
            &sanitizers
        ));
        assert!(!is_escaped_on_line("echo $x;", "x", &sanitizers));
    }

    #[test]
    fn helper_predicates_for_arrays() {
        assert!(has_indexed_occurrence("echo $row['x'];", "row"));
        assert!(!has_indexed_occurrence("echo $row;", "row"));
        assert!(in_implode_call("echo implode(',', $tags);", "tags"));
        assert!(!in_implode_call("echo $tags;", "tags"));
    }
}
