//! Shared pieces of the stub composers: prototypes for the header and
//! the function-assembly helpers driving the marshalling engines.

pub mod client;
pub mod server;

use crate::dialect::{Attribute, Dialect};
use crate::error::SignatureError;
use crate::marshal::{indent, Local, INDENT};
use crate::model::Argument;
use crate::names::make_camel;
use crate::signature::{Token, Walker};
use crate::typemap::{declare, natural_type, CType, TypeDecl};

/// A generated function prototype with its decorations.
#[derive(Clone, Debug)]
pub struct Prototype {
    pub ret: String,
    pub name: String,
    /// (type, name) pairs in declaration order.
    pub args: Vec<(String, String)>,
    pub attrs: Vec<Attribute>,
}

impl Prototype {
    /// Renders the C declaration, attributes appended in a stable order.
    pub fn render(&self, d: &Dialect) -> String {
        let args: Vec<String> = self.args.iter().map(|(t, n)| declare(t, n)).collect();
        let args = if args.is_empty() { "void".to_string() } else { args.join(", ") };
        let mut s = format!("{} {} ({})", self.ret, self.name, args);
        for a in &self.attrs {
            s.push(' ');
            s.push_str(d.attribute(*a));
        }
        s.push(';');
        s
    }

    pub fn has(&self, a: Attribute) -> bool {
        self.attrs.contains(&a)
    }
}

/// Attributes for a client-facing function: always warn-unused-result,
/// deprecated when the interface or the member is marked so.
pub fn client_attrs(deprecated: bool) -> Vec<Attribute> {
    let mut attrs = vec![Attribute::WarnUnusedResult];
    if deprecated {
        attrs.push(Attribute::Deprecated);
    }
    attrs
}

/// Assembles a complete function definition: locals hoisted to the top,
/// body stanzas separated by blank lines.
pub fn define_function(
    ret: &str,
    name: &str,
    args: &[(String, String)],
    locals: &[Local],
    stanzas: &[String],
    is_static: bool,
) -> String {
    let argstr: Vec<String> = args.iter().map(|(t, n)| declare(t, n)).collect();
    let argstr = if argstr.is_empty() { "void".to_string() } else { argstr.join(", ") };
    let mut s = String::new();
    if is_static {
        s.push_str("static ");
    }
    s.push_str(ret);
    s.push('\n');
    s.push_str(&format!("{} ({})\n{{\n", name, argstr));
    for l in locals {
        s.push_str(&format!("{}{};\n", INDENT, declare(&l.ty, &l.name)));
    }
    if !locals.is_empty() {
        s.push('\n');
    }
    s.push_str(&indent(&stanzas.join("\n\n"), 1));
    s.push_str("\n}\n");
    s
}

/// Everything the composers need to know about one argument.
pub struct ArgInfo {
    pub var: String,
    pub ctype: CType,
    pub thint: String,
}

impl ArgInfo {
    pub fn len_var(&self) -> String {
        format!("{}_len", self.var)
    }
}

/// Resolves an argument against the type mapping, registering any
/// typedefs it introduces.
pub fn arg_info(
    icamel: &str,
    mcamel: &str,
    a: &Argument,
    d: &Dialect,
    decls: &mut Vec<TypeDecl>,
) -> Result<ArgInfo, SignatureError> {
    let var = a.varname();
    let thint = format!("{}{}{}", icamel, mcamel, make_camel(&var));
    let w = Walker::new(&a.typ);
    let tok = w.current()?.ok_or(SignatureError::Empty)?;
    let ctype = natural_type(&tok, d, &thint, decls)?;
    Ok(ArgInfo { var, ctype, thint })
}

/// The walker token for an argument's (pre-validated) signature.
pub fn arg_token<'a>(typ: &'a str) -> Result<Token<'a>, SignatureError> {
    Walker::new(typ).current()?.ok_or(SignatureError::Empty)
}
