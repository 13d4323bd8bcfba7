//! XML front-end: turns an introspection document into validated
//! [`Interface`](crate::model::Interface) records.
//!
//! The parse state is a stack of tagged variants, one per recognized
//! element. Recognized elements in the wrong place are warned about and
//! ignored; unrecognized elements are ignored silently; missing
//! required attributes and invalid names, types, accesses or
//! annotations are hard errors carrying the source position.

use std::io;

use log::warn;
use xml::attribute::OwnedAttribute;
use xml::common::{Position, TextPosition};
use xml::reader::{EventReader, XmlEvent};

use crate::error::{GenError, ValidationError};
use crate::model::{Access, Argument, Direction, Interface, Method, Property, Signal};
use crate::names;
use crate::signature;

enum Node {
    Interface(Interface),
    Method(Method),
    Signal(Signal),
    Property(Property),
    Arg(Argument),
    Ignored(String),
}

impl Node {
    fn element(&self) -> &'static str {
        match self {
            Node::Interface(_) => "interface",
            Node::Method(_) => "method",
            Node::Signal(_) => "signal",
            Node::Property(_) => "property",
            Node::Arg(_) => "arg",
            Node::Ignored(_) => "",
        }
    }
}

fn at(file: &str, pos: TextPosition, kind: ValidationError) -> GenError {
    GenError::Input { file: file.into(), line: pos.row + 1, column: pos.column + 1, kind }
}

fn find_attr<'a>(attrs: &'a [OwnedAttribute], n: &str) -> Option<&'a str> {
    attrs.iter().find(|a| a.name.local_name == n).map(|a| a.value.as_str())
}

fn require_attr<'a>(
    attrs: &'a [OwnedAttribute],
    element: &'static str,
    attribute: &'static str,
) -> Result<&'a str, ValidationError> {
    find_attr(attrs, attribute)
        .ok_or(ValidationError::MissingAttribute { element, attribute })
}

fn warn_unknown_attrs(element: &str, attrs: &[OwnedAttribute], known: &[&str]) {
    for a in attrs {
        if !known.contains(&a.name.local_name.as_str()) {
            warn!("ignoring unknown attribute \"{}\" on <{}>", a.name.local_name, element);
        }
    }
}

fn check_signature(sig: &str) -> Result<(), ValidationError> {
    signature::validate_single(sig)
        .map_err(|source| ValidationError::BadSignature { sig: sig.into(), source })
}

/// Parses one introspection document into its interfaces.
pub fn parse_document(xmldata: &str, file: &str) -> Result<Vec<Interface>, GenError> {
    let mut parser = EventReader::new(io::Cursor::new(xmldata.as_bytes()));
    let mut stack: Vec<Node> = Vec::new();
    let mut interfaces: Vec<Interface> = Vec::new();
    let mut in_node = false;

    loop {
        let ev = parser
            .next()
            .map_err(|source| GenError::Xml { file: file.into(), source })?;
        let pos = parser.position();

        match ev {
            XmlEvent::StartElement { name, attributes, .. } => {
                let local = name.local_name.as_str();

                // Everything under an ignored element stays ignored.
                if matches!(stack.last(), Some(Node::Ignored(_))) {
                    stack.push(Node::Ignored(local.into()));
                    continue;
                }

                match local {
                    "node" => {
                        if stack.is_empty() && !in_node {
                            in_node = true;
                            warn_unknown_attrs("node", &attributes, &["name"]);
                        } else {
                            // Child objects are not part of this document's
                            // interfaces.
                            stack.push(Node::Ignored(local.into()));
                        }
                    }
                    "interface" => {
                        if !stack.is_empty() {
                            warn!("ignoring <interface> inside <{}>", parent_name(&stack));
                            stack.push(Node::Ignored(local.into()));
                            continue;
                        }
                        let n = require_attr(&attributes, "interface", "name")
                            .map_err(|k| at(file, pos, k))?;
                        if !names::is_valid_interface_name(n) {
                            return Err(at(file, pos, ValidationError::BadInterfaceName(n.into())));
                        }
                        warn_unknown_attrs("interface", &attributes, &["name"]);
                        stack.push(Node::Interface(Interface { name: n.into(), ..Default::default() }));
                    }
                    "method" | "signal" => {
                        if !matches!(stack.last(), Some(Node::Interface(_))) {
                            warn!("ignoring <{}> outside <interface>", local);
                            stack.push(Node::Ignored(local.into()));
                            continue;
                        }
                        let n = require_attr(&attributes, if local == "method" { "method" } else { "signal" }, "name")
                            .map_err(|k| at(file, pos, k))?;
                        if !names::is_valid_member_name(n) {
                            return Err(at(file, pos, ValidationError::BadMemberName(n.into())));
                        }
                        warn_unknown_attrs(local, &attributes, &["name"]);
                        if local == "method" {
                            stack.push(Node::Method(Method { name: n.into(), ..Default::default() }));
                        } else {
                            stack.push(Node::Signal(Signal { name: n.into(), ..Default::default() }));
                        }
                    }
                    "property" => {
                        if !matches!(stack.last(), Some(Node::Interface(_))) {
                            warn!("ignoring <property> outside <interface>");
                            stack.push(Node::Ignored(local.into()));
                            continue;
                        }
                        let n = require_attr(&attributes, "property", "name")
                            .map_err(|k| at(file, pos, k))?;
                        if !names::is_valid_member_name(n) {
                            return Err(at(file, pos, ValidationError::BadMemberName(n.into())));
                        }
                        let typ = require_attr(&attributes, "property", "type")
                            .map_err(|k| at(file, pos, k))?;
                        check_signature(typ).map_err(|k| at(file, pos, k))?;
                        let access = require_attr(&attributes, "property", "access")
                            .map_err(|k| at(file, pos, k))?;
                        let access = Access::parse(access)
                            .ok_or_else(|| at(file, pos, ValidationError::BadAccess(access.into())))?;
                        warn_unknown_attrs("property", &attributes, &["name", "type", "access"]);
                        stack.push(Node::Property(Property {
                            name: n.into(),
                            symbol: None,
                            deprecated: false,
                            typ: typ.into(),
                            access,
                        }));
                    }
                    "arg" => {
                        let (in_signal, nargs) = match stack.last() {
                            Some(Node::Method(m)) => (false, m.args.len()),
                            Some(Node::Signal(s)) => (true, s.args.len()),
                            _ => {
                                warn!("ignoring <arg> outside <method> and <signal>");
                                stack.push(Node::Ignored(local.into()));
                                continue;
                            }
                        };
                        let typ = require_attr(&attributes, "arg", "type")
                            .map_err(|k| at(file, pos, k))?;
                        check_signature(typ).map_err(|k| at(file, pos, k))?;
                        let aname = find_attr(&attributes, "name").unwrap_or("");
                        if !aname.is_empty() && !names::is_valid_member_name(aname) {
                            return Err(at(file, pos, ValidationError::BadArgumentName(aname.into())));
                        }
                        let direction = match (in_signal, find_attr(&attributes, "direction")) {
                            (false, None) | (false, Some("in")) => Direction::In,
                            (false, Some("out")) => Direction::Out,
                            (true, None) | (true, Some("out")) => Direction::Out,
                            (true, Some("in")) => {
                                return Err(at(file, pos, ValidationError::SignalArgDirection))
                            }
                            (_, Some(o)) => {
                                return Err(at(file, pos, ValidationError::BadDirection(o.into())))
                            }
                        };
                        warn_unknown_attrs("arg", &attributes, &["name", "type", "direction"]);
                        stack.push(Node::Arg(Argument {
                            name: aname.into(),
                            typ: typ.into(),
                            direction,
                            idx: nargs,
                        }));
                    }
                    "annotation" => {
                        if stack.is_empty() {
                            warn!("ignoring <annotation> outside any recognized element");
                            stack.push(Node::Ignored(local.into()));
                            continue;
                        }
                        let aname = require_attr(&attributes, "annotation", "name")
                            .map_err(|k| at(file, pos, k))?;
                        let value = require_attr(&attributes, "annotation", "value")
                            .map_err(|k| at(file, pos, k))?;
                        warn_unknown_attrs("annotation", &attributes, &["name", "value"]);
                        apply_annotation(&mut stack, aname, value).map_err(|k| at(file, pos, k))?;
                        stack.push(Node::Ignored(local.into()));
                    }
                    _ => {
                        stack.push(Node::Ignored(local.into()));
                    }
                }
            }

            XmlEvent::EndElement { name } => {
                let local = name.local_name.as_str();
                if matches!(stack.last(), Some(Node::Ignored(n)) if n == local) {
                    stack.pop();
                    continue;
                }
                match (local, stack.pop()) {
                    ("interface", Some(Node::Interface(intf))) => {
                        intf.validate().map_err(|k| at(file, pos, k))?;
                        interfaces.push(intf);
                    }
                    ("method", Some(Node::Method(m))) => {
                        if let Some(Node::Interface(i)) = stack.last_mut() {
                            i.methods.push(m);
                        }
                    }
                    ("signal", Some(Node::Signal(s))) => {
                        if let Some(Node::Interface(i)) = stack.last_mut() {
                            i.signals.push(s);
                        }
                    }
                    ("property", Some(Node::Property(p))) => {
                        if let Some(Node::Interface(i)) = stack.last_mut() {
                            i.properties.push(p);
                        }
                    }
                    ("arg", Some(Node::Arg(a))) => match stack.last_mut() {
                        Some(Node::Method(m)) => m.args.push(a),
                        Some(Node::Signal(s)) => s.args.push(a),
                        _ => (),
                    },
                    ("node", None) => in_node = false,
                    (_, Some(n)) => {
                        // Keeps the stack consistent if the document
                        // interleaves elements in a way xml-rs accepts.
                        stack.push(n);
                    }
                    (_, None) => (),
                }
            }

            XmlEvent::EndDocument => break,
            _ => (),
        }
    }

    if let Some(open) = stack.last() {
        return Err(at(file, parser.position(), ValidationError::Unterminated(open.element())));
    }

    Ok(interfaces)
}

fn parent_name(stack: &[Node]) -> &'static str {
    stack.last().map(|n| n.element()).unwrap_or("node")
}

const DEPRECATED_ANNOTATION: &str = "org.freedesktop.DBus.Deprecated";
const SYMBOL_ANNOTATION: &str = "rs.stubgen.Symbol";

fn apply_annotation(stack: &mut Vec<Node>, name: &str, value: &str) -> Result<(), ValidationError> {
    match name {
        DEPRECATED_ANNOTATION => {
            let v = match value {
                "true" => true,
                "false" => false,
                _ => return Err(ValidationError::BadDeprecated(value.into())),
            };
            match stack.last_mut() {
                Some(Node::Interface(i)) => i.deprecated = v,
                Some(Node::Method(m)) => m.deprecated = v,
                Some(Node::Signal(s)) => s.deprecated = v,
                Some(Node::Property(p)) => p.deprecated = v,
                Some(Node::Arg(_)) => {
                    return Err(ValidationError::AnnotationNotAllowed {
                        annotation: name.into(),
                        element: "arg",
                    })
                }
                _ => (),
            }
            Ok(())
        }
        SYMBOL_ANNOTATION => {
            if !names::is_valid_symbol(value) {
                return Err(ValidationError::BadSymbol(value.into()));
            }
            match stack.last_mut() {
                Some(Node::Interface(i)) => i.symbol = Some(value.into()),
                Some(Node::Method(m)) => m.symbol = Some(value.into()),
                Some(Node::Signal(s)) => s.symbol = Some(value.into()),
                Some(Node::Property(p)) => p.symbol = Some(value.into()),
                Some(Node::Arg(_)) => {
                    return Err(ValidationError::AnnotationNotAllowed {
                        annotation: name.into(),
                        element: "arg",
                    })
                }
                _ => (),
            }
            Ok(())
        }
        _ => Err(ValidationError::UnknownAnnotation(name.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<Vec<Interface>, GenError> {
        parse_document(xml, "test.xml")
    }

    #[test]
    fn minimal_interface() {
        let intfs = parse(
            r#"<node>
  <interface name="com.example.T">
    <method name="Do">
      <arg name="p" type="(is)" direction="in"/>
      <arg name="q" type="au" direction="out"/>
    </method>
    <signal name="Moved">
      <arg name="x" type="i"/>
    </signal>
    <property name="Name" type="s" access="read"/>
  </interface>
</node>"#,
        )
        .unwrap();
        assert_eq!(intfs.len(), 1);
        let i = &intfs[0];
        assert_eq!(i.name, "com.example.T");
        assert_eq!(i.methods.len(), 1);
        assert_eq!(i.methods[0].in_args().count(), 1);
        assert_eq!(i.methods[0].out_args().count(), 1);
        assert_eq!(i.signals[0].args[0].direction, Direction::Out);
        assert_eq!(i.properties[0].access, Access::Read);
    }

    #[test]
    fn missing_name_is_hard_error() {
        let e = parse("<node><interface/></node>").unwrap_err();
        match e.validation() {
            Some(ValidationError::MissingAttribute { element, attribute }) => {
                assert_eq!(*element, "interface");
                assert_eq!(*attribute, "name");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn malformed_property_type() {
        let e = parse(
            r#"<node><interface name="com.example.T">
                 <property name="Blob" type="si" access="read"/>
               </interface></node>"#,
        )
        .unwrap_err();
        match e.validation() {
            Some(ValidationError::BadSignature { sig, .. }) => assert_eq!(sig, "si"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn position_is_reported() {
        let e = parse("<node>\n  <interface name=\"nodots\"/>\n</node>").unwrap_err();
        match e {
            GenError::Input { line, kind: ValidationError::BadInterfaceName(n), .. } => {
                assert_eq!(line, 2);
                assert_eq!(n, "nodots");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn deprecated_annotation() {
        let intfs = parse(
            r#"<node><interface name="com.example.T">
                 <method name="Old">
                   <annotation name="org.freedesktop.DBus.Deprecated" value="true"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap();
        assert!(intfs[0].methods[0].deprecated);
        assert!(!intfs[0].deprecated);
    }

    #[test]
    fn unknown_annotation_is_hard_error() {
        let e = parse(
            r#"<node><interface name="com.example.T">
                 <annotation name="com.example.Mystery" value="1"/>
               </interface></node>"#,
        )
        .unwrap_err();
        assert!(matches!(e.validation(), Some(ValidationError::UnknownAnnotation(_))));
    }

    #[test]
    fn symbol_annotation_overrides() {
        let intfs = parse(
            r#"<node><interface name="com.example.T">
                 <method name="Do">
                   <annotation name="rs.stubgen.Symbol" value="run"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap();
        assert_eq!(intfs[0].methods[0].sym(), "run");
    }

    #[test]
    fn symbol_annotation_on_arg_is_rejected() {
        let e = parse(
            r#"<node><interface name="com.example.T">
                 <method name="Do">
                   <arg name="x" type="i" direction="in">
                     <annotation name="rs.stubgen.Symbol" value="y"/>
                   </arg>
                 </method>
               </interface></node>"#,
        )
        .unwrap_err();
        match e.validation() {
            Some(ValidationError::AnnotationNotAllowed { element, .. }) => {
                assert_eq!(*element, "arg");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn duplicate_arg_names_are_rejected() {
        let e = parse(
            r#"<node><interface name="com.example.T">
                 <method name="Do">
                   <arg name="x" type="i" direction="in"/>
                   <arg name="x" type="u" direction="out"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap_err();
        match e.validation() {
            Some(ValidationError::DuplicateArgumentName(n)) => assert_eq!(n, "x"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn duplicate_symbols_name_both_members() {
        let e = parse(
            r#"<node><interface name="com.example.T">
                 <method name="TestFoo"/>
                 <method name="test_foo"/>
               </interface></node>"#,
        )
        .unwrap_err();
        match e.validation() {
            Some(ValidationError::DuplicateSymbol { symbol, first, second }) => {
                assert_eq!(symbol, "test_foo");
                assert_eq!(first, "TestFoo");
                assert_eq!(second, "test_foo");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn signal_arg_direction_in_is_rejected() {
        let e = parse(
            r#"<node><interface name="com.example.T">
                 <signal name="S"><arg type="s" direction="in"/></signal>
               </interface></node>"#,
        )
        .unwrap_err();
        assert!(matches!(e.validation(), Some(ValidationError::SignalArgDirection)));
    }

    #[test]
    fn misplaced_elements_are_ignored() {
        let intfs = parse(
            r#"<node>
                 <method name="Orphan"/>
                 <interface name="com.example.T">
                   <interface name="com.example.Nested"/>
                   <mystery><arg type="zzz"/></mystery>
                 </interface>
               </node>"#,
        )
        .unwrap();
        assert_eq!(intfs.len(), 1);
        assert!(intfs[0].methods.is_empty());
    }

    #[test]
    fn child_nodes_are_ignored() {
        let intfs = parse(
            r#"<node>
                 <node name="child"><interface name="com.example.Child"/></node>
                 <interface name="com.example.T"/>
               </node>"#,
        )
        .unwrap();
        assert_eq!(intfs.len(), 1);
        assert_eq!(intfs[0].name, "com.example.T");
    }
}
