//! Server-side stub composers: method dispatch, property get/set and
//! signal emission.
//!
//! Every stub has the frame `(object, message, iter) -> ok/fail`:
//! non-null inputs are asserted, inbound arguments are demarshalled
//! with `message` as their owner, the user handler is invoked, and any
//! reply values are marshalled back. Handler prototypes land in the
//! `handlers` list; server prototypes never carry the deprecated
//! attribute.

use crate::compose::{arg_info, arg_token, define_function, Prototype};
use crate::demarshal::{self, Site};
use crate::dialect::{Attribute, Container, Dialect};
use crate::error::SignatureError;
use crate::marshal::{self, Local};
use crate::model::{Interface, Method, Property, Signal};
use crate::names::make_camel;
use crate::Output;

fn stub_args(d: &Dialect) -> Vec<(String, String)> {
    vec![
        (format!("{} *", d.object_type), "object".into()),
        (format!("{} *", d.message_type), "message".into()),
        (format!("{} *", d.iter_type), "iter".into()),
    ]
}

fn stub_asserts() -> String {
    "assert (object != NULL);\nassert (message != NULL);\nassert (iter != NULL);".into()
}

fn raise_oom(d: &Dialect) -> String {
    format!(
        "{} (message, {}, \"Out of memory\");\nreturn {};",
        d.error_raise_fn, d.err_no_memory, d.fail
    )
}

fn raise_invalid(d: &Dialect, member: &str, what: &str) -> String {
    format!(
        "{} (message, {}, \"Invalid arguments to {} {}\");\nreturn {};",
        d.error_raise_fn, d.err_invalid_args, member, what, d.fail
    )
}

/// Composes the dispatch function for one method.
pub fn method_stub(
    d: &Dialect,
    isym: &str,
    m: &Method,
    out: &mut Output,
) -> Result<(), SignatureError> {
    let msym = m.sym();
    let fn_name = format!("{}_{}_method", isym, msym);
    let handler = format!("{}_{}_handler", isym, msym);
    let icamel = make_camel(isym);
    let mcamel = make_camel(&msym);

    let oom = raise_oom(d);
    let type_err = raise_invalid(d, &m.name, "method");

    let mut locals: Vec<Local> = Vec::new();
    let mut stanzas = vec![stub_asserts()];
    let mut handler_args: Vec<(String, String)> = vec![
        ("void *".into(), "data".into()),
        (format!("{} *", d.message_type), "message".into()),
    ];
    let mut call_args: Vec<String> = vec!["object->data".into(), "message".into()];

    for a in m.in_args() {
        let info = arg_info(&icamel, &mcamel, a, d, &mut out.typedefs)?;
        locals.push(Local { ty: info.ctype.value.clone(), name: info.var.clone() });
        if info.ctype.array {
            locals.push(Local { ty: d.len_type.into(), name: info.len_var() });
        }
        let tok = arg_token(&a.typ)?;
        let len = info.len_var();
        let site = Site {
            iter: "iter",
            parent: "message",
            name: &info.var,
            len: info.ctype.array.then(|| len.as_str()),
            hint: &info.var,
            thint: &info.thint,
            oom: &oom,
            type_err: &type_err,
        };
        let frag = demarshal::demarshal(&tok, d, &site, &mut out.typedefs)?;
        locals.extend(frag.locals);
        stanzas.push(frag.code);

        handler_args.push((info.ctype.constant.clone(), info.var.clone()));
        call_args.push(info.var.clone());
        if info.ctype.array {
            handler_args.push((d.len_type.into(), info.len_var()));
            call_args.push(info.len_var());
        }
    }

    stanzas.push(format!(
        "if ({} != {}) {{\n{}\n}}",
        d.get_arg_type("iter"),
        d.invalid_constant(),
        marshal::indent(&type_err, 1)
    ));

    let outs: Vec<_> = m.out_args().collect();
    let mut out_infos = Vec::new();
    for a in &outs {
        let info = arg_info(&icamel, &mcamel, a, d, &mut out.typedefs)?;
        locals.push(Local { ty: info.ctype.value.clone(), name: info.var.clone() });
        if info.ctype.array {
            locals.push(Local { ty: d.len_type.into(), name: info.len_var() });
        }
        handler_args.push((info.ctype.pointer.clone(), info.var.clone()));
        call_args.push(format!("&{}", info.var));
        if info.ctype.array {
            handler_args.push((format!("{} *", d.len_type), info.len_var()));
            call_args.push(format!("&{}", info.len_var()));
        }
        out_infos.push(info);
    }

    stanzas.push(format!(
        "if ({} ({}) < 0)\n{}return {};",
        handler,
        call_args.join(", "),
        marshal::INDENT,
        d.fail
    ));

    if !outs.is_empty() {
        locals.push(Local { ty: "DBusMessage *".into(), name: "reply".into() });
        locals.push(Local { ty: d.iter_type.into(), name: "reply_iter".into() });

        stanzas.push(format!(
            "reply = dbus_message_new_method_return (message->message);\nif (! reply)\n{}return {};",
            marshal::INDENT,
            d.fail
        ));
        stanzas.push("dbus_message_iter_init_append (reply, &reply_iter);".into());

        let reply_oom = format!("dbus_message_unref (reply);\nreturn {};", d.fail);
        for (a, info) in outs.iter().zip(&out_infos) {
            let tok = arg_token(&a.typ)?;
            let len = info.len_var();
            let frag = marshal::marshal(
                &tok,
                d,
                "&reply_iter",
                &info.var,
                info.ctype.array.then(|| len.as_str()),
                &info.var,
                &reply_oom,
            )?;
            locals.extend(frag.locals);
            stanzas.push(frag.code);
        }

        stanzas.push(format!(
            "if (! dbus_connection_send (message->connection, reply, NULL)) {{\n{}dbus_message_unref (reply);\n{}return {};\n}}",
            marshal::INDENT,
            marshal::INDENT,
            d.fail
        ));
        stanzas.push("dbus_message_unref (reply);".into());
    }

    stanzas.push(format!("return {};", d.ok));

    out.code.push_str(&define_function(d.result_type, &fn_name, &stub_args(d), &locals, &stanzas, false));
    out.code.push('\n');
    out.prototypes.push(Prototype {
        ret: d.result_type.into(),
        name: fn_name,
        args: stub_args(d),
        attrs: vec![Attribute::WarnUnusedResult],
    });
    out.handlers.push(Prototype {
        ret: d.result_type.into(),
        name: handler,
        args: handler_args,
        attrs: vec![Attribute::WarnUnusedResult],
    });
    Ok(())
}

/// Composes the getter dispatch for one property. The iterator passed
/// in is the reply iterator; the value is wrapped in a variant of the
/// property's signature.
pub fn property_get_stub(
    d: &Dialect,
    isym: &str,
    p: &Property,
    out: &mut Output,
) -> Result<(), SignatureError> {
    let psym = p.sym();
    let fn_name = format!("{}_{}_get_property", isym, psym);
    let handler = format!("{}_{}_get_handler", isym, psym);
    let thint = format!("{}{}", make_camel(isym), make_camel(&psym));

    let tok = arg_token(&p.typ)?;
    let ctype = crate::typemap::natural_type(&tok, d, &thint, &mut out.typedefs)?;

    let mut locals = vec![Local { ty: d.iter_type.into(), name: "variter".into() }];
    locals.push(Local { ty: ctype.value.clone(), name: "value".into() });
    if ctype.array {
        locals.push(Local { ty: d.len_type.into(), name: "value_len".into() });
    }

    let mut handler_args: Vec<(String, String)> = vec![
        ("void *".into(), "data".into()),
        (format!("{} *", d.message_type), "message".into()),
        (ctype.pointer.clone(), "value".into()),
    ];
    let mut call_args = vec!["object->data".into(), "message".into(), "&value".to_string()];
    if ctype.array {
        handler_args.push((format!("{} *", d.len_type), "value_len".into()));
        call_args.push("&value_len".into());
    }

    let mut stanzas = vec![stub_asserts()];
    stanzas.push(format!(
        "if ({} ({}) < 0)\n{}return {};",
        handler,
        call_args.join(", "),
        marshal::INDENT,
        d.fail
    ));
    stanzas.push(format!(
        "if (! {}) {{\n{}return {};\n}}",
        d.open_container("iter", d.container_constant(Container::Variant), &format!("\"{}\"", p.typ), "&variter"),
        marshal::INDENT,
        d.fail
    ));

    let oom = format!("{}\nreturn {};", d.abandon_container("iter", "&variter"), d.fail);
    let frag = marshal::marshal(
        &tok,
        d,
        "&variter",
        "value",
        ctype.array.then(|| "value_len"),
        "value",
        &oom,
    )?;
    locals.extend(frag.locals);
    stanzas.push(frag.code);

    stanzas.push(format!(
        "if (! {}) {{\n{}return {};\n}}",
        d.close_container("iter", "&variter"),
        marshal::INDENT,
        d.fail
    ));
    stanzas.push(format!("return {};", d.ok));

    out.code.push_str(&define_function(d.result_type, &fn_name, &stub_args(d), &locals, &stanzas, false));
    out.code.push('\n');
    out.prototypes.push(Prototype {
        ret: d.result_type.into(),
        name: fn_name,
        args: stub_args(d),
        attrs: vec![Attribute::WarnUnusedResult],
    });
    out.handlers.push(Prototype {
        ret: d.result_type.into(),
        name: handler,
        args: handler_args,
        attrs: vec![Attribute::WarnUnusedResult],
    });
    Ok(())
}

/// Composes the setter dispatch for one property. Demands exactly one
/// argument, a variant holding the property's type, and only then
/// invokes the user's setter.
pub fn property_set_stub(
    d: &Dialect,
    isym: &str,
    p: &Property,
    out: &mut Output,
) -> Result<(), SignatureError> {
    let psym = p.sym();
    let fn_name = format!("{}_{}_set_property", isym, psym);
    let handler = format!("{}_{}_set_handler", isym, psym);
    let thint = format!("{}{}", make_camel(isym), make_camel(&psym));

    let tok = arg_token(&p.typ)?;
    let ctype = crate::typemap::natural_type(&tok, d, &thint, &mut out.typedefs)?;

    let oom = raise_oom(d);
    let type_err = raise_invalid(d, &p.name, "property");

    let mut locals = vec![Local { ty: d.iter_type.into(), name: "variter".into() }];
    locals.push(Local { ty: ctype.value.clone(), name: "value".into() });
    if ctype.array {
        locals.push(Local { ty: d.len_type.into(), name: "value_len".into() });
    }

    let mut stanzas = vec![stub_asserts()];
    stanzas.push(format!(
        "if ({} != {}) {{\n{}\n}}",
        d.get_arg_type("iter"),
        d.container_constant(Container::Variant),
        marshal::indent(&type_err, 1)
    ));
    stanzas.push(d.recurse("iter", "&variter"));

    let site = Site {
        iter: "&variter",
        parent: "message",
        name: "value",
        len: ctype.array.then(|| "value_len"),
        hint: "value",
        thint: &thint,
        oom: &oom,
        type_err: &type_err,
    };
    let frag = demarshal::demarshal(&tok, d, &site, &mut out.typedefs)?;
    locals.extend(frag.locals);
    stanzas.push(frag.code);

    stanzas.push(d.next("iter"));
    stanzas.push(format!(
        "if ({} != {}) {{\n{}\n}}",
        d.get_arg_type("iter"),
        d.invalid_constant(),
        marshal::indent(&type_err, 1)
    ));

    let mut handler_args: Vec<(String, String)> = vec![
        ("void *".into(), "data".into()),
        (format!("{} *", d.message_type), "message".into()),
        (ctype.constant.clone(), "value".into()),
    ];
    let mut call_args = vec!["object->data".to_string(), "message".into(), "value".into()];
    if ctype.array {
        handler_args.push((d.len_type.into(), "value_len".into()));
        call_args.push("value_len".into());
    }

    stanzas.push(format!(
        "if ({} ({}) < 0)\n{}return {};",
        handler,
        call_args.join(", "),
        marshal::INDENT,
        d.fail
    ));
    stanzas.push(format!("return {};", d.ok));

    out.code.push_str(&define_function(d.result_type, &fn_name, &stub_args(d), &locals, &stanzas, false));
    out.code.push('\n');
    out.prototypes.push(Prototype {
        ret: d.result_type.into(),
        name: fn_name,
        args: stub_args(d),
        attrs: vec![Attribute::WarnUnusedResult],
    });
    out.handlers.push(Prototype {
        ret: d.result_type.into(),
        name: handler,
        args: handler_args,
        attrs: vec![Attribute::WarnUnusedResult],
    });
    Ok(())
}

/// Composes the emit function for one signal: builds the signal
/// message, marshals every argument in declaration order and sends it.
pub fn signal_stub(
    d: &Dialect,
    intf: &Interface,
    isym: &str,
    s: &Signal,
    out: &mut Output,
) -> Result<(), SignatureError> {
    let ssym = s.sym();
    let fn_name = format!("{}_emit_{}", isym, ssym);
    let icamel = make_camel(isym);
    let scamel = make_camel(&ssym);

    let mut args: Vec<(String, String)> = vec![
        ("DBusConnection *".into(), "connection".into()),
        ("const char *".into(), "origin_path".into()),
    ];
    let mut locals = vec![
        Local { ty: "DBusMessage *".into(), name: "signal".into() },
        Local { ty: d.iter_type.into(), name: "iter".into() },
    ];
    let mut stanzas = vec!["assert (connection != NULL);\nassert (origin_path != NULL);".to_string()];

    stanzas.push(format!(
        "signal = dbus_message_new_signal (origin_path, \"{}\", \"{}\");\nif (! signal)\n{}return {};",
        intf.name,
        s.name,
        marshal::INDENT,
        d.fail
    ));
    stanzas.push("dbus_message_iter_init_append (signal, &iter);".into());

    let oom = format!("dbus_message_unref (signal);\nreturn {};", d.fail);
    let mut frags = Vec::new();
    for a in &s.args {
        let info = arg_info(&icamel, &scamel, a, d, &mut out.typedefs)?;
        args.push((info.ctype.constant.clone(), info.var.clone()));
        if info.ctype.array {
            args.push((d.len_type.into(), info.len_var()));
        }
        let tok = arg_token(&a.typ)?;
        let len = info.len_var();
        let frag = marshal::marshal(
            &tok,
            d,
            "&iter",
            &info.var,
            info.ctype.array.then(|| len.as_str()),
            &info.var,
            &oom,
        )?;
        locals.extend(frag.locals);
        frags.push(frag.code);
    }
    stanzas.extend(frags);

    stanzas.push(format!(
        "if (! dbus_connection_send (connection, signal, NULL)) {{\n{}dbus_message_unref (signal);\n{}return {};\n}}",
        marshal::INDENT,
        marshal::INDENT,
        d.fail
    ));
    stanzas.push("dbus_message_unref (signal);".into());
    stanzas.push(format!("return {};", d.ok));

    out.code.push_str(&define_function(d.result_type, &fn_name, &args, &locals, &stanzas, false));
    out.code.push('\n');
    out.prototypes.push(Prototype {
        ret: d.result_type.into(),
        name: fn_name,
        args,
        attrs: vec![Attribute::WarnUnusedResult],
    });
    Ok(())
}
