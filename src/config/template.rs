//! Positional placeholder substitution for formatter templates.
//!
//! `{}` and `{0}` are replaced with the argument, `{{` and `}}` produce literal
//! braces. Anything else between braces is copied through unchanged.

pub(crate) fn fill(template: &str, arg: &str) -> String {
    let mut out = String::with_capacity(template.len() + arg.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{}") {
            out.push_str(arg);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{0}") {
            out.push_str(arg);
            rest = after;
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}
