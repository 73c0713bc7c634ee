//! SQL placeholder rewriting for the postgres dialect.

/// Rewrite `?` placeholders to `$N` for postgres.
///
/// A `?` inside a single-quoted string literal is left alone. Quote state
/// toggles on every `'`, so an escaped `''` pair toggles out and straight
/// back in, which keeps the in-quote parity correct for balanced literals.
pub fn rebind(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 4);
    let mut n = 1;
    let mut in_quote = false;
    for c in query.chars() {
        if c == '\'' {
            in_quote = !in_quote;
        }
        if c == '?' && !in_quote {
            out.push('$');
            out.push_str(&n.to_string());
            n += 1;
        } else {
            out.push(c);
        }
    }
    out
}
