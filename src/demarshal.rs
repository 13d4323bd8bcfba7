//! Generates the code fragments that read a value from a message
//! iterator with full type checking.
//!
//! Every fragment checks the wire type before allocating anything for
//! the same step, duplicates string-like values into storage owned by
//! the supplied parent, releases partially built state back to the
//! parent before running a recovery fragment, and advances the source
//! iterator exactly once on success.

use crate::dialect::{Container, Dialect};
use crate::error::SignatureError;
use crate::marshal::{indent, Fragment, Local, INDENT};
use crate::signature::{Token, Walker};
use crate::typemap::{declare, element_store_type, natural_type, pointer_to, TypeDecl};

/// A demarshalling fragment: generated code, the locals it needs, and
/// the outputs the caller should bind.
#[derive(Debug)]
pub struct DemFragment {
    pub code: String,
    pub locals: Vec<Local>,
    pub outputs: Vec<Local>,
}

/// Everything a demarshalling site needs to know.
pub struct Site<'a> {
    /// Iterator pointer expression positioned at the value.
    pub iter: &'a str,
    /// Owner of any storage allocated for the value.
    pub parent: &'a str,
    /// Lvalue the result is stored into.
    pub name: &'a str,
    /// Lvalue for the element count when the type is an array.
    pub len: Option<&'a str>,
    /// Prefix for locals.
    pub hint: &'a str,
    /// CamelCase prefix for typedef names.
    pub thint: &'a str,
    /// Recovery fragment for allocation failure.
    pub oom: &'a str,
    /// Recovery fragment for a wire type mismatch.
    pub type_err: &'a str,
}

fn check_type(d: &Dialect, iter: &str, constant: &str, type_err: &str) -> String {
    format!(
        "if ({} != {}) {{\n{}\n}}",
        d.get_arg_type(iter),
        constant,
        indent(type_err, 1)
    )
}

/// Emits code reading a value of the walked type from `site.iter` into
/// `site.name`, and returns it with the outputs the caller binds.
pub fn demarshal(
    tok: &Token,
    d: &Dialect,
    site: &Site,
    decls: &mut Vec<TypeDecl>,
) -> Result<DemFragment, SignatureError> {
    let ct = natural_type(tok, d, site.thint, decls)?;
    let mut outputs = vec![Local { ty: ct.value, name: site.name.into() }];
    if ct.array {
        outputs.push(Local {
            ty: d.len_type.into(),
            name: site.len.map(|l| l.to_string()).unwrap_or_else(|| format!("{}_len", site.name)),
        });
    }
    let frag = demarshal_inner(tok, d, site, decls)?;
    Ok(DemFragment { code: frag.code, locals: frag.locals, outputs })
}

fn demarshal_inner(
    tok: &Token,
    d: &Dialect,
    site: &Site,
    decls: &mut Vec<TypeDecl>,
) -> Result<Fragment, SignatureError> {
    match tok {
        Token::Basic(b) if b.is_string_like() => {
            let dup = format!("{}_dbus", site.hint);
            let code = vec![
                check_type(d, site.iter, d.basic_constant(*b), site.type_err),
                d.get_basic(site.iter, &format!("&{}", dup)),
                format!(
                    "{} = {} ({}, {});\nif (! {}) {{\n{}\n}}",
                    site.name, d.strdup_fn, site.parent, dup, site.name,
                    indent(site.oom, 1)
                ),
                d.next(site.iter),
            ]
            .join("\n\n");
            Ok(Fragment {
                code,
                locals: vec![Local { ty: "const char *".into(), name: dup }],
            })
        }
        Token::Basic(b) => {
            let code = vec![
                check_type(d, site.iter, d.basic_constant(*b), site.type_err),
                d.get_basic(site.iter, &format!("&{}", site.name)),
                d.next(site.iter),
            ]
            .join("\n\n");
            Ok(Fragment { code, locals: vec![] })
        }
        Token::Variant => {
            let code = vec![
                check_type(d, site.iter, d.container_constant(Container::Variant), site.type_err),
                format!(
                    "if ({} ({}, {}, &{}) < 0) {{\n{}\n}}",
                    d.variant_demarshal_fn, site.parent, site.iter, site.name,
                    indent(site.oom, 1)
                ),
                d.next(site.iter),
            ]
            .join("\n\n");
            Ok(Fragment { code, locals: vec![] })
        }
        Token::Struct(fields) => demarshal_struct(fields, d, site, decls),
        Token::DictEntry(kv) => demarshal_dict_entry(kv, d, site, decls),
        Token::Array(elems) => demarshal_array(elems, d, site, decls),
    }
}

/// Release fragment run before recovery code once `name` holds a
/// partially built value.
fn release(d: &Dialect, parent: &str, name: &str) -> String {
    format!("{} ({}, {});\n{} = NULL;", d.discard_fn, parent, name, name)
}

fn demarshal_struct(
    fields: &Walker,
    d: &Dialect,
    site: &Site,
    decls: &mut Vec<TypeDecl>,
) -> Result<Fragment, SignatureError> {
    let sub = format!("{}_iter", site.hint);
    let subref = format!("&{}", sub);
    let freed = release(d, site.parent, site.name);
    let field_oom = format!("{}\n{}", freed, site.oom);
    let field_type_err = format!("{}\n{}", freed, site.type_err);

    let mut locals = vec![Local { ty: d.iter_type.into(), name: sub }];
    let mut parts = vec![
        check_type(d, site.iter, d.container_constant(Container::Struct), site.type_err),
        d.recurse(site.iter, &subref),
        format!(
            "{} = {} ({}, sizeof ({}));\nif (! {}) {{\n{}\n}}",
            site.name, d.alloc_fn, site.parent, site.thint, site.name,
            indent(site.oom, 1)
        ),
    ];

    let mut f = fields.clone();
    let mut i = 0;
    while let Some(ftok) = f.current()? {
        let fname = format!("{}->item{}", site.name, i);
        let flen = format!("{}->item{}_len", site.name, i);
        let fsite = Site {
            iter: &subref,
            parent: site.name,
            name: &fname,
            len: matches!(ftok, Token::Array(_)).then(|| flen.as_str()),
            hint: &format!("{}_item{}", site.hint, i),
            thint: &format!("{}Item{}", site.thint, i),
            oom: &field_oom,
            type_err: &field_type_err,
        };
        let frag = demarshal_inner(&ftok, d, &fsite, decls)?;
        locals.extend(frag.locals);
        parts.push(frag.code);
        f.advance()?;
        i += 1;
    }

    parts.push(check_type(d, &subref, d.invalid_constant(), &field_type_err));
    parts.push(d.next(site.iter));
    Ok(Fragment { code: parts.join("\n\n"), locals })
}

fn demarshal_dict_entry(
    kv: &Walker,
    d: &Dialect,
    site: &Site,
    decls: &mut Vec<TypeDecl>,
) -> Result<Fragment, SignatureError> {
    let sub = format!("{}_iter", site.hint);
    let subref = format!("&{}", sub);
    let freed = release(d, site.parent, site.name);
    let field_oom = format!("{}\n{}", freed, site.oom);
    let field_type_err = format!("{}\n{}", freed, site.type_err);

    let mut kv2 = kv.clone();
    let ktok = kv2.current()?.ok_or(SignatureError::UnexpectedEnd)?;
    kv2.advance()?;
    let vtok = kv2.current()?.ok_or(SignatureError::UnexpectedEnd)?;

    let mut locals = vec![Local { ty: d.iter_type.into(), name: sub }];
    let mut parts = vec![
        check_type(d, site.iter, d.container_constant(Container::DictEntry), site.type_err),
        d.recurse(site.iter, &subref),
        format!(
            "{} = {} ({}, sizeof ({}));\nif (! {}) {{\n{}\n}}",
            site.name, d.alloc_fn, site.parent, site.thint, site.name,
            indent(site.oom, 1)
        ),
    ];

    let kname = format!("{}->key", site.name);
    let ksite = Site {
        iter: &subref,
        parent: site.name,
        name: &kname,
        len: None,
        hint: &format!("{}_key", site.hint),
        thint: site.thint,
        oom: &field_oom,
        type_err: &field_type_err,
    };
    let kfrag = demarshal_inner(&ktok, d, &ksite, decls)?;
    locals.extend(kfrag.locals);
    parts.push(kfrag.code);

    let vname = format!("{}->value", site.name);
    let vlen = format!("{}->value_len", site.name);
    let vsite = Site {
        iter: &subref,
        parent: site.name,
        name: &vname,
        len: matches!(vtok, Token::Array(_)).then(|| vlen.as_str()),
        hint: &format!("{}_value", site.hint),
        thint: &format!("{}Value", site.thint),
        oom: &field_oom,
        type_err: &field_type_err,
    };
    let vfrag = demarshal_inner(&vtok, d, &vsite, decls)?;
    locals.extend(vfrag.locals);
    parts.push(vfrag.code);

    parts.push(d.next(site.iter));
    Ok(Fragment { code: parts.join("\n\n"), locals })
}

fn demarshal_array(
    elems: &Walker,
    d: &Dialect,
    site: &Site,
    decls: &mut Vec<TypeDecl>,
) -> Result<Fragment, SignatureError> {
    let elem = elems.current()?.ok_or(SignatureError::UnexpectedEnd)?;
    let store = element_store_type(&elem, d, site.thint, decls)?;
    let sub = format!("{}_iter", site.hint);
    let subref = format!("&{}", sub);
    let evar = format!("{}_element", site.hint);
    let tmp = format!("{}_tmp", site.hint);
    let default_len = format!("{}_len", site.name);
    let len = site.len.unwrap_or(&default_len);

    let freed = release(d, site.parent, site.name);
    let elem_oom = format!("{}\n{}", freed, site.oom);
    let elem_type_err = format!("{}\n{}", freed, site.type_err);

    // The element itself.
    let child = match &elem {
        Token::Array(_) => {
            // Nested arrays live behind a { items, len } wrapper.
            let wrapper = format!("{}Element", site.thint);
            let items = format!("{}->items", evar);
            let wlen = format!("{}->len", evar);
            let wrapper_freed = format!("{}\n{}", release(d, site.parent, &evar), elem_oom);
            let wrapper_freed_type = format!("{}\n{}", release(d, site.parent, &evar), elem_type_err);
            let isite = Site {
                iter: &subref,
                parent: &evar,
                name: &items,
                len: Some(&wlen),
                hint: &evar,
                thint: &wrapper,
                oom: &wrapper_freed,
                type_err: &wrapper_freed_type,
            };
            let inner = demarshal_inner(&elem, d, &isite, decls)?;
            let alloc = format!(
                "{} = {} ({}, sizeof ({}));\nif (! {}) {{\n{}\n}}",
                evar, d.alloc_fn, site.parent, wrapper, evar,
                indent(&elem_oom, 1)
            );
            Fragment {
                code: format!("{}\n\n{}", alloc, inner.code),
                locals: inner.locals,
            }
        }
        _ => {
            let ethint = match &elem {
                Token::DictEntry(_) => format!("{}Entry", site.thint),
                _ => format!("{}Element", site.thint),
            };
            let esite = Site {
                iter: &subref,
                parent: site.parent,
                name: &evar,
                len: None,
                hint: &evar,
                thint: &ethint,
                oom: &elem_oom,
                type_err: &elem_type_err,
            };
            demarshal_inner(&elem, d, &esite, decls)?
        }
    };

    let mut body = String::new();
    body.push_str(&format!("{}{};\n", INDENT, declare(&store, &evar)));
    body.push_str(&format!("{}{};\n", INDENT, declare(&pointer_to(&store), &tmp)));
    for l in &child.locals {
        body.push_str(&format!("{}{};\n", INDENT, declare(&l.ty, &l.name)));
    }
    body.push('\n');
    body.push_str(&indent(&child.code, 1));
    body.push_str("\n\n");
    body.push_str(&indent(
        &format!(
            "{} = {} ({}, {}, sizeof ({}) * ({} + 1));\nif (! {}) {{\n{}\n{}\n}}",
            tmp, d.realloc_fn, site.parent, site.name, store, len, tmp,
            indent(&release(d, site.parent, site.name), 1),
            indent(site.oom, 1)
        ),
        1,
    ));
    body.push_str("\n\n");
    body.push_str(&indent(
        &format!("{} = {};\n{}[{}] = {};\n{}++;", site.name, tmp, site.name, len, evar, len),
        1,
    ));

    let parts = vec![
        check_type(d, site.iter, d.container_constant(Container::Array), site.type_err),
        d.recurse(site.iter, &subref),
        format!(
            "{} = {} ({}, sizeof ({}));\nif (! {}) {{\n{}\n}}",
            site.name, d.alloc_fn, site.parent, store, site.name,
            indent(site.oom, 1)
        ),
        format!("{} = 0;", len),
        format!(
            "while ({} != {}) {{\n{}\n}}",
            d.get_arg_type(&subref),
            d.invalid_constant(),
            body
        ),
        d.next(site.iter),
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

    fn frag(sig: &str, name: &str, len: Option<&str>) -> DemFragment {
        let d = Dialect::libdbus();
        let w = Walker::new(sig);
        let tok = w.current().unwrap().unwrap();
        let mut decls = vec![];
        let site = Site {
            iter: "iter",
            parent: "message",
            name,
            len,
            hint: name,
            thint: "TestT",
            oom: "return -1;",
            type_err: "return -2;",
        };
        demarshal(&tok, &d, &site, &mut decls).unwrap()
    }

    #[test]
    fn basic() {
        let f = frag("u", "value", None);
        assert_eq!(
            f.code,
            "if (dbus_message_iter_get_arg_type (iter) != DBUS_TYPE_UINT32) {\n        return -2;\n}\n\n\
             dbus_message_iter_get_basic (iter, &value);\n\n\
             dbus_message_iter_next (iter);"
        );
        assert_eq!(f.outputs.len(), 1);
        assert_eq!(f.outputs[0].ty, "uint32_t");
    }

    #[test]
    fn string_dups_into_parent() {
        let f = frag("s", "value", None);
        assert!(f.code.contains("dbus_message_iter_get_basic (iter, &value_dbus);"));
        assert!(f.code.contains("value = stub_strdup (message, value_dbus);"));
        assert_eq!(f.locals[0].ty, "const char *");
        // Type check comes before the allocation.
        assert!(f.code.find("DBUS_TYPE_STRING").unwrap() < f.code.find("stub_strdup").unwrap());
    }

    #[test]
    fn array_counts_and_releases() {
        let f = frag("au", "value", Some("value_len"));
        assert!(f.code.contains("dbus_message_iter_recurse (iter, &value_iter);"));
        assert!(f.code.contains("value = stub_alloc (message, sizeof (uint32_t));"));
        assert!(f.code.contains("value_len = 0;"));
        assert!(f.code.contains("while (dbus_message_iter_get_arg_type (&value_iter) != DBUS_TYPE_INVALID)"));
        assert!(f.code.contains("value_tmp = stub_realloc (message, value, sizeof (uint32_t) * (value_len + 1));"));
        assert!(f.code.contains("stub_discard (message, value);"));
        assert!(f.code.contains("value[value_len] = value_element;"));
        assert_eq!(f.outputs.len(), 2);
        assert_eq!(f.outputs[1].name, "value_len");
    }

    #[test]
    fn struct_checks_trailing_fields() {
        let f = frag("(is)", "p", None);
        assert!(f.code.contains("p = stub_alloc (message, sizeof (TestT));"));
        assert!(f.code.contains("p->item0"));
        assert!(f.code.contains("p->item1 = stub_strdup (p, p_item1_dbus);"));
        assert!(f.code.contains("if (dbus_message_iter_get_arg_type (&p_iter) != DBUS_TYPE_INVALID)"));
    }

    #[test]
    fn dict_parents_strings_to_entry() {
        let f = frag("a{ss}", "map", Some("map_len"));
        assert!(f.code.contains("map_element = stub_alloc (message, sizeof (TestTEntry));"));
        assert!(f.code.contains("map_element->key = stub_strdup (map_element, map_element_key_dbus);"));
        assert!(f.code.contains("map_element->value = stub_strdup (map_element, map_element_value_dbus);"));
    }
}
