//! The typed records produced by the XML front-end and walked read-only
//! by the code generator.

use crate::error::ValidationError;
use crate::names::{make_snake, make_varname};

/// Which stubs a property gets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn parse(s: &str) -> Option<Access> {
        match s {
            "read" => Some(Access::Read),
            "write" => Some(Access::Write),
            "readwrite" => Some(Access::ReadWrite),
            _ => None,
        }
    }

    pub fn can_get(self) -> bool {
        self != Access::Write
    }

    pub fn can_set(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Clone, Debug)]
pub struct Argument {
    /// D-Bus argument name; may be empty.
    pub name: String,
    /// A single complete signature, validated at parse time.
    pub typ: String,
    pub direction: Direction,
    /// Position within the owning member's argument list.
    pub idx: usize,
}

impl Argument {
    /// The C variable name used for this argument.
    pub fn varname(&self) -> String {
        if self.name.is_empty() {
            format!("arg{}", self.idx)
        } else {
            make_varname(&self.name)
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Method {
    pub name: String,
    pub symbol: Option<String>,
    pub deprecated: bool,
    pub args: Vec<Argument>,
}

impl Method {
    pub fn sym(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| make_snake(&self.name))
    }

    pub fn in_args(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter().filter(|a| a.direction == Direction::In)
    }

    pub fn out_args(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter().filter(|a| a.direction == Direction::Out)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Signal {
    pub name: String,
    pub symbol: Option<String>,
    pub deprecated: bool,
    /// Always direction out.
    pub args: Vec<Argument>,
}

impl Signal {
    pub fn sym(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| make_snake(&self.name))
    }
}

#[derive(Clone, Debug)]
pub struct Property {
    pub name: String,
    pub symbol: Option<String>,
    pub deprecated: bool,
    /// A single complete signature, validated at parse time.
    pub typ: String,
    pub access: Access,
}

impl Property {
    pub fn sym(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| make_snake(&self.name))
    }
}

#[derive(Clone, Debug, Default)]
pub struct Interface {
    pub name: String,
    pub symbol: Option<String>,
    pub deprecated: bool,
    pub methods: Vec<Method>,
    pub signals: Vec<Signal>,
    pub properties: Vec<Property>,
}

impl Interface {
    /// The function-name prefix for this interface, honoring an
    /// explicit symbol and the skip-prefix option.
    pub fn sym(&self, skipprefix: Option<&str>) -> String {
        if let Some(s) = &self.symbol {
            return s.clone();
        }
        let mut n = self.name.as_str();
        if let Some(p) = skipprefix {
            if n.len() > p.len() && n.starts_with(p) {
                n = &n[p.len()..];
            }
        }
        make_snake(n)
    }

    /// Checks the cross-member invariants: no duplicate symbols within
    /// a member kind, no duplicate argument names within a member.
    ///
    /// Generated identifiers must be stable across reruns, so a
    /// collision is a hard error rather than grounds for renaming.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_symbols(self.methods.iter().map(|m| (m.sym(), m.name.as_str())))?;
        check_symbols(self.signals.iter().map(|s| (s.sym(), s.name.as_str())))?;
        check_symbols(self.properties.iter().map(|p| (p.sym(), p.name.as_str())))?;
        for m in &self.methods {
            check_arg_names(&m.args)?;
        }
        for s in &self.signals {
            check_arg_names(&s.args)?;
        }
        Ok(())
    }
}

fn check_symbols<'a, I>(members: I) -> Result<(), ValidationError>
where
    I: Iterator<Item = (String, &'a str)>,
{
    let mut seen: Vec<(String, &'a str)> = Vec::new();
    for (sym, name) in members {
        if let Some((_, first)) = seen.iter().find(|(s, _)| *s == sym) {
            return Err(ValidationError::DuplicateSymbol {
                symbol: sym,
                first: (*first).into(),
                second: name.into(),
            });
        }
        seen.push((sym, name));
    }
    Ok(())
}

fn check_arg_names(args: &[Argument]) -> Result<(), ValidationError> {
    let mut seen: Vec<&str> = Vec::new();
    for a in args {
        // Unnamed arguments are disambiguated positionally.
        if a.name.is_empty() {
            continue;
        }
        if seen.contains(&a.name.as_str()) {
            return Err(ValidationError::DuplicateArgumentName(a.name.clone()));
        }
        seen.push(&a.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access() {
        assert_eq!(Access::parse("read"), Some(Access::Read));
        assert_eq!(Access::parse("frobnicate"), None);
        assert!(Access::Read.can_get());
        assert!(!Access::Read.can_set());
        assert!(!Access::Write.can_get());
        assert!(Access::ReadWrite.can_get() && Access::ReadWrite.can_set());
    }

    #[test]
    fn derived_symbols_collide() {
        let intf = Interface {
            name: "com.example.T".into(),
            methods: vec![
                Method { name: "TestFoo".into(), ..Default::default() },
                Method { name: "test_foo".into(), ..Default::default() },
            ],
            ..Default::default()
        };
        match intf.validate() {
            Err(ValidationError::DuplicateSymbol { symbol, first, second }) => {
                assert_eq!(symbol, "test_foo");
                assert_eq!(first, "TestFoo");
                assert_eq!(second, "test_foo");
            }
            other => panic!("expected DuplicateSymbol, got {:?}", other.err()),
        }
    }

    #[test]
    fn explicit_symbol_wins() {
        let m = Method { name: "TestFoo".into(), symbol: Some("frob".into()), ..Default::default() };
        assert_eq!(m.sym(), "frob");
    }

    #[test]
    fn interface_symbol() {
        let intf = Interface { name: "com.example.Test".into(), ..Default::default() };
        assert_eq!(intf.sym(None), "com_example_test");
        assert_eq!(intf.sym(Some("com.example.")), "test");
        assert_eq!(intf.sym(Some("org.freedesktop.")), "com_example_test");
    }

    #[test]
    fn unnamed_args_get_positional_names() {
        let a = Argument { name: "".into(), typ: "s".into(), direction: Direction::Out, idx: 2 };
        assert_eq!(a.varname(), "arg2");
    }

    #[test]
    fn duplicate_arg_names_are_rejected() {
        let arg = |name: &str, idx| Argument {
            name: name.into(),
            typ: "i".into(),
            direction: Direction::In,
            idx,
        };
        let intf = Interface {
            name: "com.example.T".into(),
            methods: vec![Method {
                name: "Do".into(),
                args: vec![arg("x", 0), arg("x", 1)],
                ..Default::default()
            }],
            ..Default::default()
        };
        match intf.validate() {
            Err(ValidationError::DuplicateArgumentName(n)) => assert_eq!(n, "x"),
            other => panic!("expected DuplicateArgumentName, got {:?}", other.err()),
        }

        // Repeated unnamed arguments are fine.
        let intf = Interface {
            name: "com.example.T".into(),
            methods: vec![Method {
                name: "Do".into(),
                args: vec![arg("", 0), arg("", 1)],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(intf.validate().is_ok());
    }
}
