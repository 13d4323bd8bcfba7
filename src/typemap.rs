//! Mapping from D-Bus types to their natural C forms.

use crate::dialect::Dialect;
use crate::error::SignatureError;
use crate::signature::Token;

/// The C rendering of a single D-Bus type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CType {
    /// Natural value type, e.g. `int32_t` or `char *`.
    pub value: String,
    /// Pointer-to form, used for out parameters.
    pub pointer: String,
    /// Const form, used for in parameters.
    pub constant: String,
    /// Whether an explicit length travels with the value.
    pub array: bool,
}

impl CType {
    /// Whether values of this type are passed around by plain copy.
    pub fn is_scalar(&self) -> bool {
        !self.array && !self.value.ends_with('*')
    }
}

/// A typedef the generated code depends on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub code: String,
}

/// Renders a C declaration, keeping `*` attached to the name.
pub fn declare(ty: &str, name: &str) -> String {
    if ty.ends_with('*') {
        format!("{}{}", ty, name)
    } else {
        format!("{} {}", ty, name)
    }
}

/// Pointer to a C type, keeping `*`s attached.
pub fn pointer_to(ty: &str) -> String {
    if ty.ends_with('*') {
        format!("{}*", ty)
    } else {
        format!("{} *", ty)
    }
}

fn register(decls: &mut Vec<TypeDecl>, name: &str, code: String) {
    if !decls.iter().any(|d| d.name == name) {
        decls.push(TypeDecl { name: name.into(), code });
    }
}

/// C type an array element is stored as.
///
/// Compound elements are stored as pointers to typedef'd structs so a
/// growing element block never moves the values it refers to; nested
/// arrays get a `{ items, len }` wrapper typedef.
pub fn element_store_type(
    tok: &Token,
    d: &Dialect,
    thint: &str,
    decls: &mut Vec<TypeDecl>,
) -> Result<String, SignatureError> {
    Ok(match tok {
        Token::Basic(b) if b.is_string_like() => "char *".into(),
        Token::Basic(b) => d.basic_value_type(*b).into(),
        Token::Variant => format!("{} *", d.variant_type),
        Token::Struct(_) => natural_type(tok, d, &format!("{}Element", thint), decls)?.value,
        Token::DictEntry(_) => natural_type(tok, d, &format!("{}Entry", thint), decls)?.value,
        Token::Array(_) => {
            let name = format!("{}Element", thint);
            let inner = natural_type(tok, d, &name, decls)?;
            let mut members = String::new();
            members.push_str(&format!("        {};\n", declare(&inner.value, "items")));
            members.push_str(&format!("        {};\n", declare(d.len_type, "len")));
            register(decls, &name, format!("typedef struct {{\n{}}} {};\n", members, name));
            format!("{} *", name)
        }
    })
}

/// Maps one complete type to its natural C forms, registering any
/// typedefs it needs under names derived from `thint`.
pub fn natural_type(
    tok: &Token,
    d: &Dialect,
    thint: &str,
    decls: &mut Vec<TypeDecl>,
) -> Result<CType, SignatureError> {
    Ok(match tok {
        Token::Basic(b) if b.is_string_like() => CType {
            value: "char *".into(),
            pointer: "char **".into(),
            constant: "const char *".into(),
            array: false,
        },
        Token::Basic(b) => {
            let v = d.basic_value_type(*b);
            CType {
                value: v.into(),
                pointer: format!("{} *", v),
                constant: v.into(),
                array: false,
            }
        }
        Token::Variant => CType {
            value: format!("{} *", d.variant_type),
            pointer: format!("{} **", d.variant_type),
            constant: format!("const {} *", d.variant_type),
            array: false,
        },
        Token::Struct(fields) => {
            let mut f = fields.clone();
            let mut members = String::new();
            let mut i = 0;
            while let Some(ftok) = f.current()? {
                let ct = natural_type(&ftok, d, &format!("{}Item{}", thint, i), decls)?;
                members.push_str(&format!("        {};\n", declare(&ct.value, &format!("item{}", i))));
                if ct.array {
                    members.push_str(&format!(
                        "        {};\n",
                        declare(d.len_type, &format!("item{}_len", i))
                    ));
                }
                f.advance()?;
                i += 1;
            }
            register(decls, thint, format!("typedef struct {{\n{}}} {};\n", members, thint));
            CType {
                value: format!("{} *", thint),
                pointer: format!("{} **", thint),
                constant: format!("const {} *", thint),
                array: false,
            }
        }
        Token::DictEntry(kv) => {
            let mut kv = kv.clone();
            let ktok = kv.current()?.ok_or(SignatureError::UnexpectedEnd)?;
            let kct = natural_type(&ktok, d, thint, decls)?;
            kv.advance()?;
            let vtok = kv.current()?.ok_or(SignatureError::UnexpectedEnd)?;
            let vct = natural_type(&vtok, d, &format!("{}Value", thint), decls)?;
            let mut members = String::new();
            members.push_str(&format!("        {};\n", declare(&kct.value, "key")));
            members.push_str(&format!("        {};\n", declare(&vct.value, "value")));
            if vct.array {
                members.push_str(&format!("        {};\n", declare(d.len_type, "value_len")));
            }
            register(decls, thint, format!("typedef struct {{\n{}}} {};\n", members, thint));
            CType {
                value: format!("{} *", thint),
                pointer: format!("{} **", thint),
                constant: format!("const {} *", thint),
                array: false,
            }
        }
        Token::Array(elems) => {
            let elem = elems.current()?.ok_or(SignatureError::UnexpectedEnd)?;
            let store = element_store_type(&elem, d, thint, decls)?;
            let constant = if store.ends_with('*') {
                format!("{} const *", store)
            } else {
                format!("const {} *", store)
            };
            CType {
                value: pointer_to(&store),
                pointer: pointer_to(&pointer_to(&store)),
                constant,
                array: true,
            }
        }
    })
}
