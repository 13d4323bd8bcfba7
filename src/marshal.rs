//! Generates the code fragments that append a value onto a message
//! iterator.
//!
//! Fragments are blocks of lines without a trailing newline, written at
//! indent level zero; callers indent them into place. Container
//! open/close is balanced on every exit path: a failure inside an open
//! container abandons it before running the caller's recovery code.

use crate::dialect::{Container, Dialect};
use crate::error::SignatureError;
use crate::signature::{Token, Walker};
use crate::typemap::declare;

pub const INDENT: &str = "        ";

/// A variable some fragment declares or needs declared.
#[derive(Clone, Debug)]
pub struct Local {
    pub ty: String,
    pub name: String,
}

/// A generated code fragment plus the locals it needs hoisted into the
/// enclosing declaration block.
#[derive(Debug, Default)]
pub struct Fragment {
    pub code: String,
    pub locals: Vec<Local>,
}

/// Indents every non-empty line of `code` by `levels`.
pub fn indent(code: &str, levels: usize) -> String {
    let pad = INDENT.repeat(levels);
    code.lines()
        .map(|l| if l.is_empty() { String::new() } else { format!("{}{}", pad, l) })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders a declaration block for loop bodies.
fn local_block(locals: &[Local], extra: &str) -> String {
    let mut s = String::new();
    for l in locals {
        s.push_str(&format!("{}{};\n", INDENT, declare(&l.ty, &l.name)));
    }
    s.push_str(extra);
    s
}

/// Emits code appending the value named by `name` (of the walked type)
/// onto the iterator expression `iter`, running `oom` on failure.
///
/// `len` names the length expression when the type is an array; `hint`
/// prefixes the locals this fragment introduces.
pub fn marshal(
    tok: &Token,
    d: &Dialect,
    iter: &str,
    name: &str,
    len: Option<&str>,
    hint: &str,
    oom: &str,
) -> Result<Fragment, SignatureError> {
    match tok {
        Token::Basic(b) => {
            let code = format!(
                "if (! {}) {{\n{}\n}}",
                d.append_basic(iter, d.basic_constant(*b), &format!("&{}", name)),
                indent(oom, 1)
            );
            Ok(Fragment { code, locals: vec![] })
        }
        Token::Variant => {
            let code = format!(
                "if ({} ({}, {}) < 0) {{\n{}\n}}",
                d.variant_marshal_fn,
                iter,
                name,
                indent(oom, 1)
            );
            Ok(Fragment { code, locals: vec![] })
        }
        Token::Struct(fields) => marshal_struct(fields, d, iter, name, hint, oom),
        Token::DictEntry(kv) => marshal_dict_entry(kv, d, iter, name, hint, oom),
        Token::Array(elems) => marshal_array(elems, d, iter, name, len, hint, oom),
    }
}

fn marshal_struct(
    fields: &Walker,
    d: &Dialect,
    iter: &str,
    name: &str,
    hint: &str,
    oom: &str,
) -> Result<Fragment, SignatureError> {
    let sub = format!("{}_iter", hint);
    let subref = format!("&{}", sub);
    let inner_oom = format!("{}\n{}", d.abandon_container(iter, &subref), oom);

    let mut locals = vec![Local { ty: d.iter_type.into(), name: sub }];
    let mut parts = vec![format!(
        "if (! {}) {{\n{}\n}}",
        d.open_container(iter, d.container_constant(Container::Struct), "NULL", &subref),
        indent(oom, 1)
    )];

    let mut f = fields.clone();
    let mut i = 0;
    while let Some(ftok) = f.current()? {
        let fname = format!("{}->item{}", name, i);
        let flen = format!("{}->item{}_len", name, i);
        let flen = matches!(ftok, Token::Array(_)).then(|| flen.as_str());
        let frag = marshal(&ftok, d, &subref, &fname, flen, &format!("{}_item{}", hint, i), &inner_oom)?;
        locals.extend(frag.locals);
        parts.push(frag.code);
        f.advance()?;
        i += 1;
    }

    parts.push(format!(
        "if (! {}) {{\n{}\n}}",
        d.close_container(iter, &subref),
        indent(oom, 1)
    ));
    Ok(Fragment { code: parts.join("\n\n"), locals })
}

fn marshal_dict_entry(
    kv: &Walker,
    d: &Dialect,
    iter: &str,
    name: &str,
    hint: &str,
    oom: &str,
) -> Result<Fragment, SignatureError> {
    let sub = format!("{}_iter", hint);
    let subref = format!("&{}", sub);
    let inner_oom = format!("{}\n{}", d.abandon_container(iter, &subref), oom);

    let mut kv2 = kv.clone();
    let ktok = kv2.current()?.ok_or(SignatureError::UnexpectedEnd)?;
    kv2.advance()?;
    let vtok = kv2.current()?.ok_or(SignatureError::UnexpectedEnd)?;

    let mut locals = vec![Local { ty: d.iter_type.into(), name: sub }];
    let mut parts = vec![format!(
        "if (! {}) {{\n{}\n}}",
        d.open_container(iter, d.container_constant(Container::DictEntry), "NULL", &subref),
        indent(oom, 1)
    )];

    let kfrag = marshal(&ktok, d, &subref, &format!("{}->key", name), None, &format!("{}_key", hint), &inner_oom)?;
    locals.extend(kfrag.locals);
    parts.push(kfrag.code);

    let vlen = format!("{}->value_len", name);
    let vlen = matches!(vtok, Token::Array(_)).then(|| vlen.as_str());
    let vfrag = marshal(&vtok, d, &subref, &format!("{}->value", name), vlen, &format!("{}_value", hint), &inner_oom)?;
    locals.extend(vfrag.locals);
    parts.push(vfrag.code);

    parts.push(format!(
        "if (! {}) {{\n{}\n}}",
        d.close_container(iter, &subref),
        indent(oom, 1)
    ));
    Ok(Fragment { code: parts.join("\n\n"), locals })
}

fn marshal_array(
    elems: &Walker,
    d: &Dialect,
    iter: &str,
    name: &str,
    len: Option<&str>,
    hint: &str,
    oom: &str,
) -> Result<Fragment, SignatureError> {
    let elem = elems.current()?.ok_or(SignatureError::UnexpectedEnd)?;
    let esig = elems.signature()?;
    let sub = format!("{}_iter", hint);
    let subref = format!("&{}", sub);
    let ivar = format!("{}_i", hint);
    let default_len = format!("{}_len", name);
    let len = len.unwrap_or(&default_len);
    let inner_oom = format!("{}\n{}", d.abandon_container(iter, &subref), oom);

    let elem_expr = format!("{}[{}]", name, ivar);
    let ehint = format!("{}_element", hint);
    let child = match &elem {
        Token::Array(_) => marshal(
            &elem,
            d,
            &subref,
            &format!("{}->items", elem_expr),
            Some(&format!("{}->len", elem_expr)),
            &ehint,
            &inner_oom,
        )?,
        _ => marshal(&elem, d, &subref, &elem_expr, None, &ehint, &inner_oom)?,
    };

    let mut body = local_block(&child.locals, if child.locals.is_empty() { "" } else { "\n" });
    body.push_str(&indent(&child.code, 1));

    let parts = vec![
        format!(
            "if (! {}) {{\n{}\n}}",
            d.open_container(
                iter,
                d.container_constant(Container::Array),
                &format!("\"{}\"", esig),
                &subref
            ),
            indent(oom, 1)
        ),
        format!(
            "for ({} {} = 0; {} < {}; {}++) {{\n{}\n}}",
            d.len_type, ivar, ivar, len, ivar, body
        ),
        format!(
            "if (! {}) {{\n{}\n}}",
            d.close_container(iter, &subref),
            indent(oom, 1)
        ),
    ];

    Ok(Fragment {
        code: parts.join("\n\n"),
        locals: vec![Local { ty: d.iter_type.into(), name: sub }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Walker;

    fn frag(sig: &str, name: &str, len: Option<&str>) -> Fragment {
        let d = Dialect::libdbus();
        let w = Walker::new(sig);
        let tok = w.current().unwrap().unwrap();
        marshal(&tok, &d, "&iter", name, len, name, "return -1;").unwrap()
    }

    #[test]
    fn basic() {
        let f = frag("i", "value", None);
        assert_eq!(
            f.code,
            "if (! dbus_message_iter_append_basic (&iter, DBUS_TYPE_INT32, &value)) {\n        return -1;\n}"
        );
        assert!(f.locals.is_empty());
    }

    #[test]
    fn array_of_basic() {
        let f = frag("au", "value", Some("value_len"));
        assert!(f.code.contains("dbus_message_iter_open_container (&iter, DBUS_TYPE_ARRAY, \"u\", &value_iter)"));
        assert!(f.code.contains("for (size_t value_i = 0; value_i < value_len; value_i++)"));
        assert!(f.code.contains("dbus_message_iter_append_basic (&value_iter, DBUS_TYPE_UINT32, &value[value_i])"));
        assert!(f.code.contains("dbus_message_iter_abandon_container (&iter, &value_iter);"));
        assert!(f.code.contains("dbus_message_iter_close_container (&iter, &value_iter)"));
        assert_eq!(f.locals.len(), 1);
        assert_eq!(f.locals[0].name, "value_iter");
    }

    #[test]
    fn struct_fields_in_order() {
        let f = frag("(is)", "p", None);
        let open = f.code.find("DBUS_TYPE_STRUCT").unwrap();
        let i0 = f.code.find("&p->item0").unwrap();
        let i1 = f.code.find("p->item1").unwrap();
        let close = f.code.find("close_container").unwrap();
        assert!(open < i0 && i0 < i1 && i1 < close);
    }

    #[test]
    fn dict_marshals_key_then_value() {
        let f = frag("a{ss}", "map", Some("map_len"));
        assert!(f.code.contains("DBUS_TYPE_DICT_ENTRY"));
        let k = f.code.find("map[map_i]->key").unwrap();
        let v = f.code.find("map[map_i]->value").unwrap();
        assert!(k < v);
    }

    #[test]
    fn balanced_containers() {
        for sig in &["au", "a{sv}", "(i(ss))", "aau", "a(ias)"] {
            let f = frag(sig, "value", Some("value_len"));
            let opens = f.code.matches("_open_container (").count();
            let closes = f.code.matches("_close_container (").count();
            assert_eq!(opens, closes, "unbalanced for {}", sig);
        }
    }
}
