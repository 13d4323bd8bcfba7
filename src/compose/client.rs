//! Client-side stub composers: synchronous method calls, the
//! asynchronous call pair, and property get/set over the standard
//! Properties interface.
//!
//! All client functions report failure through a `StubError **` out
//! parameter; remote errors are translated into it (a remote NoMemory
//! becomes a local NoMemory), and demarshalling of results retries on
//! allocation failure until the output slot is filled.

use crate::compose::{arg_info, arg_token, client_attrs, define_function, ArgInfo, Prototype};
use crate::demarshal::{self, Site};
use crate::dialect::{Container, Dialect};
use crate::error::SignatureError;
use crate::marshal::{self, indent, Local, INDENT};
use crate::model::{Interface, Method, Property};
use crate::names::make_camel;
use crate::typemap::TypeDecl;
use crate::Output;

const PROPERTIES_INTERFACE: &str = "DBUS_INTERFACE_PROPERTIES";

fn new_method_call(d: &Dialect, interface: &str, member: &str, fail: &str) -> String {
    format!(
        "method_call = dbus_message_new_method_call (proxy->name, proxy->path, {}, \"{}\");\nif (! method_call) {{\n{}{} (error);\n{}return {};\n}}",
        interface, member, INDENT, d.error_set_no_memory_fn, INDENT, fail
    )
}

fn send_and_translate(d: &Dialect) -> Vec<String> {
    let translate = format!(
        "if (dbus_error_has_name (&dbus_error, {})) {{\n{}{} (error);\n}} else {{\n{}{} (error, dbus_error.name, dbus_error.message);\n}}",
        d.err_no_memory, INDENT, d.error_set_no_memory_fn, INDENT, d.error_set_remote_fn
    );
    let on_fail = format!(
        "dbus_message_unref (method_call);\n{}\ndbus_error_free (&dbus_error);\nreturn {};",
        translate, d.fail
    );
    vec![
        "dbus_error_init (&dbus_error);".into(),
        format!(
            "reply = dbus_connection_send_with_reply_and_block (proxy->connection, method_call, proxy->timeout, &dbus_error);\nif (! reply) {{\n{}\n}}",
            indent(&on_fail, 1)
        ),
        "dbus_message_unref (method_call);".into(),
    ]
}

fn reply_type_err(d: &Dialect, what: &str) -> String {
    format!(
        "dbus_message_unref (reply);\n{} (error, {}, \"Invalid arguments in {} reply\");\nreturn {};",
        d.error_set_fn, d.err_code_invalid_args, what, d.fail
    )
}

fn marshal_in_oom(d: &Dialect, fail: &str) -> String {
    format!(
        "dbus_message_unref (method_call);\n{} (error);\nreturn {};",
        d.error_set_no_memory_fn, fail
    )
}

fn append_string_literal(d: &Dialect, var: &str, value: &str, fail: &str) -> String {
    format!(
        "{} = \"{}\";\nif (! {}) {{\n{}dbus_message_unref (method_call);\n{}{} (error);\n{}return {};\n}}",
        var,
        value,
        d.append_basic("&iter", "DBUS_TYPE_STRING", &format!("&{}", var)),
        INDENT,
        INDENT,
        d.error_set_no_memory_fn,
        INDENT,
        fail
    )
}

/// Marshals the in arguments of `m` onto `&iter`, extending locals and
/// stanzas, and collecting the function parameters.
fn marshal_ins(
    d: &Dialect,
    icamel: &str,
    mcamel: &str,
    m: &Method,
    oom: &str,
    args: &mut Vec<(String, String)>,
    asserts: &mut Vec<String>,
    locals: &mut Vec<Local>,
    stanzas: &mut Vec<String>,
    decls: &mut Vec<TypeDecl>,
) -> Result<(), SignatureError> {
    for a in m.in_args() {
        let info = arg_info(icamel, mcamel, a, d, decls)?;
        args.push((info.ctype.constant.clone(), info.var.clone()));
        if info.ctype.array {
            args.push((d.len_type.into(), info.len_var()));
        }
        if info.ctype.constant.ends_with('*') {
            asserts.push(format!("assert ({} != NULL);", info.var));
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
            oom,
        )?;
        locals.extend(frag.locals);
        stanzas.push(frag.code);
    }
    Ok(())
}

/// Demarshals one output slot, wrapping the allocation-sensitive part
/// in a retry loop that exits when the slot is non-null.
fn demarshal_out(
    d: &Dialect,
    info: &ArgInfo,
    tok: &crate::signature::Token,
    type_err: &str,
    locals: &mut Vec<Local>,
    stanzas: &mut Vec<String>,
    decls: &mut Vec<TypeDecl>,
) -> Result<(), SignatureError> {
    let slot = format!("(*{})", info.var);
    let slot_len = format!("(*{})", info.len_var());
    let site = Site {
        iter: "&iter",
        parent: "parent",
        name: &slot,
        len: info.ctype.array.then(|| slot_len.as_str()),
        hint: &info.var,
        thint: &info.thint,
        oom: "continue;",
        type_err,
    };
    let frag = demarshal::demarshal(tok, d, &site, decls)?;
    locals.extend(frag.locals);
    if info.ctype.is_scalar() {
        stanzas.push(frag.code);
    } else {
        stanzas.push(format!("do {{\n{}\n}} while (! {});", indent(&frag.code, 1), slot));
    }
    Ok(())
}

/// Composes the blocking call function for one method.
pub fn method_sync_stub(
    d: &Dialect,
    intf: &Interface,
    isym: &str,
    m: &Method,
    out: &mut Output,
) -> Result<(), SignatureError> {
    let msym = m.sym();
    let fn_name = format!("{}_{}_sync", isym, msym);
    let icamel = make_camel(isym);
    let mcamel = make_camel(&msym);
    let has_ins = m.in_args().next().is_some();
    let outs: Vec<_> = m.out_args().collect();

    let mut args: Vec<(String, String)> = Vec::new();
    if !outs.is_empty() {
        args.push(("const void *".into(), "parent".into()));
    }
    args.push((format!("{} *", d.proxy_type), "proxy".into()));

    let mut asserts = vec!["assert (proxy != NULL);".to_string()];
    let mut locals = vec![
        Local { ty: "DBusMessage *".into(), name: "method_call".into() },
        Local { ty: d.iter_type.into(), name: "iter".into() },
        Local { ty: "DBusMessage *".into(), name: "reply".into() },
        Local { ty: "DBusError".into(), name: "dbus_error".into() },
    ];
    let mut stanzas: Vec<String> = Vec::new();

    stanzas.push(new_method_call(d, &format!("\"{}\"", intf.name), &m.name, d.fail));
    if has_ins {
        stanzas.push("dbus_message_iter_init_append (method_call, &iter);".into());
    }

    let oom = marshal_in_oom(d, d.fail);
    marshal_ins(d, &icamel, &mcamel, m, &oom, &mut args, &mut asserts, &mut locals, &mut stanzas, &mut out.typedefs)?;

    stanzas.extend(send_and_translate(d));

    let type_err = reply_type_err(d, &m.name);
    stanzas.push("dbus_message_iter_init (reply, &iter);".into());
    for a in &outs {
        let info = arg_info(&icamel, &mcamel, a, d, &mut out.typedefs)?;
        args.push((info.ctype.pointer.clone(), info.var.clone()));
        asserts.push(format!("assert ({} != NULL);", info.var));
        if info.ctype.array {
            args.push((format!("{} *", d.len_type), info.len_var()));
            asserts.push(format!("assert ({} != NULL);", info.len_var()));
        }
        let tok = arg_token(&a.typ)?;
        demarshal_out(d, &info, &tok, &type_err, &mut locals, &mut stanzas, &mut out.typedefs)?;
    }
    stanzas.push(format!(
        "if ({} != {}) {{\n{}\n}}",
        d.get_arg_type("&iter"),
        d.invalid_constant(),
        indent(&type_err, 1)
    ));
    stanzas.push("dbus_message_unref (reply);".into());
    stanzas.push(format!("return {};", d.ok));

    args.push((format!("{} **", d.error_type), "error".into()));
    stanzas.insert(0, asserts.join("\n"));

    out.code.push_str(&define_function(d.result_type, &fn_name, &args, &locals, &stanzas, false));
    out.code.push('\n');
    out.prototypes.push(Prototype {
        ret: d.result_type.into(),
        name: fn_name,
        args,
        attrs: client_attrs(intf.deprecated || m.deprecated),
    });
    Ok(())
}

/// Composes the asynchronous pair for one method: the static notify
/// dispatcher and the caller-facing function returning a pending call.
///
/// Cancellation is by releasing the pending call; a released call's
/// continuation is never invoked, and the continuation otherwise fires
/// at most once, on the dispatcher context.
pub fn method_async_stub(
    d: &Dialect,
    intf: &Interface,
    isym: &str,
    m: &Method,
    out: &mut Output,
) -> Result<(), SignatureError> {
    let msym = m.sym();
    let fn_name = format!("{}_{}", isym, msym);
    let notify_name = format!("{}_{}_notify", isym, msym);
    let icamel = make_camel(isym);
    let mcamel = make_camel(&msym);
    let reply_typedef = format!("{}{}Reply", icamel, mcamel);
    let has_ins = m.in_args().next().is_some();
    let outs: Vec<_> = m.out_args().collect();

    // Reply callback typedef, registered with the other typedefs.
    let mut cb_args: Vec<(String, String)> = vec![
        ("void *".into(), "data".into()),
        (format!("{} *", d.message_type), "message".into()),
    ];
    let mut out_infos = Vec::new();
    for a in &outs {
        let info = arg_info(&icamel, &mcamel, a, d, &mut out.typedefs)?;
        cb_args.push((info.ctype.constant.clone(), info.var.clone()));
        if info.ctype.array {
            cb_args.push((d.len_type.into(), info.len_var()));
        }
        out_infos.push(info);
    }
    let cb_params: Vec<String> = cb_args
        .iter()
        .map(|(t, n)| crate::typemap::declare(t, n))
        .collect();
    if !out.typedefs.iter().any(|t| t.name == reply_typedef) {
        out.typedefs.push(TypeDecl {
            name: reply_typedef.clone(),
            code: format!("typedef void (*{}) ({});\n", reply_typedef, cb_params.join(", ")),
        });
    }

    // The notify dispatcher.
    let notify_args: Vec<(String, String)> = vec![
        ("DBusPendingCall *".into(), "pending_call".into()),
        (format!("{} *", d.pending_data_type), "pending_data".into()),
    ];
    let mut locals = vec![
        Local { ty: "DBusMessage *".into(), name: "reply".into() },
        Local { ty: d.iter_type.into(), name: "iter".into() },
        Local { ty: format!("{} *", d.message_type), name: "message".into() },
        Local { ty: "DBusError".into(), name: "dbus_error".into() },
    ];
    let mut stanzas = vec![
        "assert (pending_call != NULL);\nassert (pending_data != NULL);".to_string(),
        "assert (dbus_pending_call_get_completed (pending_call));".into(),
        "reply = dbus_pending_call_steal_reply (pending_call);\nassert (reply != NULL);".into(),
    ];

    let error_reply = "dbus_error_init (&dbus_error);\n\
                       dbus_set_error_from_message (&dbus_error, reply);\n\
                       pending_data->error_handler (pending_data->data, dbus_error.name, dbus_error.message);\n\
                       dbus_error_free (&dbus_error);\n\
                       dbus_message_unref (reply);\n\
                       return;";
    stanzas.push(format!(
        "if (dbus_message_get_type (reply) == DBUS_MESSAGE_TYPE_ERROR) {{\n{}\n}}",
        indent(error_reply, 1)
    ));

    let notify_oom = format!(
        "{} (message);\ndbus_message_unref (reply);\npending_data->error_handler (pending_data->data, {}, \"Out of memory\");\nreturn;",
        d.message_free_fn, d.err_no_memory
    );
    let notify_type_err = format!(
        "{} (message);\ndbus_message_unref (reply);\npending_data->error_handler (pending_data->data, {}, \"Invalid arguments in {} reply\");\nreturn;",
        d.message_free_fn, d.err_invalid_args, m.name
    );

    stanzas.push(format!(
        "message = {} (pending_data->connection, reply);\nif (! message) {{\n{}pending_data->error_handler (pending_data->data, {}, \"Out of memory\");\n{}dbus_message_unref (reply);\n{}return;\n}}",
        d.message_new_fn, INDENT, d.err_no_memory, INDENT, INDENT
    ));
    stanzas.push("dbus_message_iter_init (reply, &iter);".into());

    let mut handler_call = vec!["pending_data->data".to_string(), "message".into()];
    for (a, info) in outs.iter().zip(&out_infos) {
        locals.push(Local { ty: info.ctype.value.clone(), name: info.var.clone() });
        if info.ctype.array {
            locals.push(Local { ty: d.len_type.into(), name: info.len_var() });
        }
        let tok = arg_token(&a.typ)?;
        let len = info.len_var();
        let site = Site {
            iter: "&iter",
            parent: "message",
            name: &info.var,
            len: info.ctype.array.then(|| len.as_str()),
            hint: &info.var,
            thint: &info.thint,
            oom: &notify_oom,
            type_err: &notify_type_err,
        };
        let frag = demarshal::demarshal(&tok, d, &site, &mut out.typedefs)?;
        locals.extend(frag.locals);
        stanzas.push(frag.code);
        handler_call.push(info.var.clone());
        if info.ctype.array {
            handler_call.push(info.len_var());
        }
    }
    stanzas.push(format!(
        "if ({} != {}) {{\n{}\n}}",
        d.get_arg_type("&iter"),
        d.invalid_constant(),
        indent(&notify_type_err, 1)
    ));
    stanzas.push(format!(
        "(({}) pending_data->handler) ({});",
        reply_typedef,
        handler_call.join(", ")
    ));
    stanzas.push(format!("{} (message);\ndbus_message_unref (reply);", d.message_free_fn));

    out.code.push_str(&define_function("void", &notify_name, &notify_args, &locals, &stanzas, true));
    out.code.push('\n');

    // The caller-facing function.
    let mut args: Vec<(String, String)> = vec![(format!("{} *", d.proxy_type), "proxy".into())];
    let mut asserts = vec![
        "assert (proxy != NULL);".to_string(),
        "assert (handler != NULL);".into(),
        "assert (error_handler != NULL);".into(),
    ];
    let mut locals = vec![
        Local { ty: "DBusMessage *".into(), name: "method_call".into() },
        Local { ty: "DBusPendingCall *".into(), name: "pending_call".into() },
        Local { ty: format!("{} *", d.pending_data_type), name: "pending_data".into() },
    ];
    if has_ins {
        locals.insert(1, Local { ty: d.iter_type.into(), name: "iter".into() });
    }
    let mut stanzas: Vec<String> = Vec::new();

    stanzas.push(new_method_call(d, &format!("\"{}\"", intf.name), &m.name, "NULL"));
    if has_ins {
        stanzas.push("dbus_message_iter_init_append (method_call, &iter);".into());
    }
    let oom = marshal_in_oom(d, "NULL");
    marshal_ins(d, &icamel, &mcamel, m, &oom, &mut args, &mut asserts, &mut locals, &mut stanzas, &mut out.typedefs)?;

    stanzas.push(format!(
        "pending_data = {} (proxy->connection, ({}) handler, error_handler, data);\nif (! pending_data) {{\n{}dbus_message_unref (method_call);\n{}{} (error);\n{}return NULL;\n}}",
        d.pending_data_new_fn, d.reply_handler_cast, INDENT, INDENT, d.error_set_no_memory_fn, INDENT
    ));
    stanzas.push(format!(
        "if (! dbus_connection_send_with_reply (proxy->connection, method_call, &pending_call, proxy->timeout)) {{\n{}dbus_message_unref (method_call);\n{}{} (pending_data);\n{}{} (error);\n{}return NULL;\n}}",
        INDENT, INDENT, d.pending_data_free_fn, INDENT, d.error_set_no_memory_fn, INDENT
    ));
    stanzas.push("dbus_message_unref (method_call);".into());
    stanzas.push(format!(
        "if (! pending_call) {{\n{}{} (pending_data);\n{}{} (error, {}, \"Connection is closed\");\n{}return NULL;\n}}",
        INDENT, d.pending_data_free_fn, INDENT, d.error_set_fn, d.err_code_disconnected, INDENT
    ));
    stanzas.push(format!(
        "if (! dbus_pending_call_set_notify (pending_call, (DBusPendingCallNotifyFunction) {}, pending_data, (DBusFreeFunction) {})) {{\n{}dbus_pending_call_cancel (pending_call);\n{}dbus_pending_call_unref (pending_call);\n{}{} (pending_data);\n{}{} (error);\n{}return NULL;\n}}",
        notify_name, d.pending_data_free_fn, INDENT, INDENT, INDENT, d.pending_data_free_fn, INDENT, d.error_set_no_memory_fn, INDENT
    ));
    stanzas.push("return pending_call;".into());

    args.push((reply_typedef.clone(), "handler".into()));
    args.push((d.error_handler_type.into(), "error_handler".into()));
    args.push(("void *".into(), "data".into()));
    args.push((format!("{} **", d.error_type), "error".into()));
    stanzas.insert(0, asserts.join("\n"));

    out.code.push_str(&define_function("DBusPendingCall *", &fn_name, &args, &locals, &stanzas, false));
    out.code.push('\n');
    out.prototypes.push(Prototype {
        ret: "DBusPendingCall *".into(),
        name: fn_name,
        args,
        attrs: client_attrs(intf.deprecated || m.deprecated),
    });
    Ok(())
}

/// Composes the blocking property read over Properties.Get.
pub fn property_get_stub(
    d: &Dialect,
    intf: &Interface,
    isym: &str,
    p: &Property,
    out: &mut Output,
) -> Result<(), SignatureError> {
    let psym = p.sym();
    let fn_name = format!("{}_get_{}_sync", isym, psym);
    let thint = format!("{}{}", make_camel(isym), make_camel(&psym));

    let tok = arg_token(&p.typ)?;
    let ctype = crate::typemap::natural_type(&tok, d, &thint, &mut out.typedefs)?;

    let mut args: Vec<(String, String)> = vec![
        ("const void *".into(), "parent".into()),
        (format!("{} *", d.proxy_type), "proxy".into()),
        (ctype.pointer.clone(), "value".into()),
    ];
    let mut asserts = vec!["assert (proxy != NULL);".to_string(), "assert (value != NULL);".into()];
    if ctype.array {
        args.push((format!("{} *", d.len_type), "value_len".into()));
        asserts.push("assert (value_len != NULL);".into());
    }
    args.push((format!("{} **", d.error_type), "error".into()));

    let mut locals = vec![
        Local { ty: "DBusMessage *".into(), name: "method_call".into() },
        Local { ty: d.iter_type.into(), name: "iter".into() },
        Local { ty: d.iter_type.into(), name: "variter".into() },
        Local { ty: "DBusMessage *".into(), name: "reply".into() },
        Local { ty: "DBusError".into(), name: "dbus_error".into() },
        Local { ty: "const char *".into(), name: "interface".into() },
        Local { ty: "const char *".into(), name: "property".into() },
    ];

    let mut stanzas = vec![asserts.join("\n")];
    stanzas.push(new_method_call(d, PROPERTIES_INTERFACE, "Get", d.fail));
    stanzas.push("dbus_message_iter_init_append (method_call, &iter);".into());
    stanzas.push(append_string_literal(d, "interface", &intf.name, d.fail));
    stanzas.push(append_string_literal(d, "property", &p.name, d.fail));
    stanzas.extend(send_and_translate(d));

    let type_err = reply_type_err(d, &format!("{} property", p.name));
    stanzas.push("dbus_message_iter_init (reply, &iter);".into());

    let variant_check = format!(
        "if ({} != {}) {{\n{}\n}}",
        d.get_arg_type("&iter"),
        d.container_constant(Container::Variant),
        indent(&type_err, 1)
    );
    let site = Site {
        iter: "&variter",
        parent: "parent",
        name: "(*value)",
        len: ctype.array.then(|| "(*value_len)"),
        hint: "value",
        thint: &thint,
        oom: "continue;",
        type_err: &type_err,
    };
    let frag = demarshal::demarshal(&tok, d, &site, &mut out.typedefs)?;
    locals.extend(frag.locals);

    let read = format!("{}\n\n{}\n\n{}", variant_check, d.recurse("&iter", "&variter"), frag.code);
    if ctype.is_scalar() {
        stanzas.push(read);
    } else {
        stanzas.push(format!("do {{\n{}\n}} while (! (*value));", indent(&read, 1)));
    }

    stanzas.push(d.next("&iter"));
    stanzas.push(format!(
        "if ({} != {}) {{\n{}\n}}",
        d.get_arg_type("&iter"),
        d.invalid_constant(),
        indent(&type_err, 1)
    ));
    stanzas.push("dbus_message_unref (reply);".into());
    stanzas.push(format!("return {};", d.ok));

    out.code.push_str(&define_function(d.result_type, &fn_name, &args, &locals, &stanzas, false));
    out.code.push('\n');
    out.prototypes.push(Prototype {
        ret: d.result_type.into(),
        name: fn_name,
        args,
        attrs: client_attrs(intf.deprecated || p.deprecated),
    });
    Ok(())
}

/// Composes the blocking property write over Properties.Set.
pub fn property_set_stub(
    d: &Dialect,
    intf: &Interface,
    isym: &str,
    p: &Property,
    out: &mut Output,
) -> Result<(), SignatureError> {
    let psym = p.sym();
    let fn_name = format!("{}_set_{}_sync", isym, psym);
    let thint = format!("{}{}", make_camel(isym), make_camel(&psym));

    let tok = arg_token(&p.typ)?;
    let ctype = crate::typemap::natural_type(&tok, d, &thint, &mut out.typedefs)?;

    let mut args: Vec<(String, String)> = vec![
        (format!("{} *", d.proxy_type), "proxy".into()),
        (ctype.constant.clone(), "value".into()),
    ];
    let mut asserts = vec!["assert (proxy != NULL);".to_string()];
    if ctype.constant.ends_with('*') {
        asserts.push("assert (value != NULL);".into());
    }
    if ctype.array {
        args.push((d.len_type.into(), "value_len".into()));
    }
    args.push((format!("{} **", d.error_type), "error".into()));

    let mut locals = vec![
        Local { ty: "DBusMessage *".into(), name: "method_call".into() },
        Local { ty: d.iter_type.into(), name: "iter".into() },
        Local { ty: d.iter_type.into(), name: "variter".into() },
        Local { ty: "DBusMessage *".into(), name: "reply".into() },
        Local { ty: "DBusError".into(), name: "dbus_error".into() },
        Local { ty: "const char *".into(), name: "interface".into() },
        Local { ty: "const char *".into(), name: "property".into() },
    ];

    let mut stanzas = vec![asserts.join("\n")];
    stanzas.push(new_method_call(d, PROPERTIES_INTERFACE, "Set", d.fail));
    stanzas.push("dbus_message_iter_init_append (method_call, &iter);".into());
    stanzas.push(append_string_literal(d, "interface", &intf.name, d.fail));
    stanzas.push(append_string_literal(d, "property", &p.name, d.fail));

    let unref_oom = marshal_in_oom(d, d.fail);
    stanzas.push(format!(
        "if (! {}) {{\n{}\n}}",
        d.open_container("&iter", d.container_constant(Container::Variant), &format!("\"{}\"", p.typ), "&variter"),
        indent(&unref_oom, 1)
    ));
    let marshal_oom = format!("{}\n{}", d.abandon_container("&iter", "&variter"), unref_oom);
    let frag = marshal::marshal(
        &tok,
        d,
        "&variter",
        "value",
        ctype.array.then(|| "value_len"),
        "value",
        &marshal_oom,
    )?;
    locals.extend(frag.locals);
    stanzas.push(frag.code);
    stanzas.push(format!(
        "if (! {}) {{\n{}\n}}",
        d.close_container("&iter", "&variter"),
        indent(&unref_oom, 1)
    ));

    stanzas.extend(send_and_translate(d));

    let type_err = reply_type_err(d, &format!("{} property", p.name));
    stanzas.push(format!(
        "if (dbus_message_iter_init (reply, &iter)) {{\n{}\n}}",
        indent(&type_err, 1)
    ));
    stanzas.push("dbus_message_unref (reply);".into());
    stanzas.push(format!("return {};", d.ok));

    out.code.push_str(&define_function(d.result_type, &fn_name, &args, &locals, &stanzas, false));
    out.code.push('\n');
    out.prototypes.push(Prototype {
        ret: d.result_type.into(),
        name: fn_name,
        args,
        attrs: client_attrs(intf.deprecated || p.deprecated),
    });
    Ok(())
}
