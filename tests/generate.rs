use dbus_stubgen::signature::{Basic, Token, Walker};
use dbus_stubgen::{generate, Attribute, Dialect, GenOpts, ValidationError};

fn gen(xml: &str) -> dbus_stubgen::Output {
    generate(xml, &GenOpts::default()).unwrap()
}

/// The body of the named generated function.
fn function<'a>(code: &'a str, name: &str) -> &'a str {
    let start = code.find(&format!("\n{} (", name)).unwrap_or_else(|| panic!("no function {}", name));
    let end = code[start..].find("\n}\n").map(|e| start + e).unwrap();
    &code[start..end]
}

static READONLY_PROP: &str = r#"
<node>
  <interface name="com.example.T">
    <property name="Name" type="s" access="read"/>
  </interface>
</node>
"#;

#[test]
fn readonly_string_property() {
    let out = gen(READONLY_PROP);

    // Server: one get stub wrapping the handler result in a variant of "s".
    let get = function(&out.code, "com_example_t_name_get_property");
    assert!(get.contains("com_example_t_name_get_handler (object->data, message, &value)"));
    assert!(get.contains("dbus_message_iter_open_container (iter, DBUS_TYPE_VARIANT, \"s\", &variter)"));
    assert!(get.contains("dbus_message_iter_close_container (iter, &variter)"));
    // The handler runs before the value is marshalled.
    assert!(get.find("get_handler").unwrap() < get.find("open_container").unwrap());
    assert!(!out.code.contains("com_example_t_name_set_property"));

    // Client: Properties.Get, result duplicated into the caller's parent.
    let get = function(&out.code, "com_example_t_get_name_sync");
    assert!(get.contains("DBUS_INTERFACE_PROPERTIES, \"Get\""));
    assert!(get.contains("interface = \"com.example.T\";"));
    assert!(get.contains("property = \"Name\";"));
    assert!(get.contains("(*value) = stub_strdup (parent, value_dbus);"));
    assert!(get.contains("} while (! (*value));"));
    assert!(!out.code.contains("com_example_t_set_name_sync"));

    // Remote error translation.
    assert!(get.contains("dbus_error_has_name (&dbus_error, DBUS_ERROR_NO_MEMORY)"));
    assert!(get.contains("stub_error_set_remote (error, dbus_error.name, dbus_error.message)"));
}

#[test]
fn malformed_property_type_aborts_generation() {
    let e = generate(
        r#"<node><interface name="com.example.T">
             <property name="Blob" type="si" access="readwrite"/>
           </interface></node>"#,
        &GenOpts::default(),
    )
    .unwrap_err();
    match e.validation() {
        Some(ValidationError::BadSignature { sig, .. }) => assert_eq!(sig, "si"),
        other => panic!("unexpected: {:?}", other),
    }
}

static STRUCT_IN_ARRAY_OUT: &str = r#"
<node>
  <interface name="com.example.T">
    <method name="Do">
      <arg name="p" type="(is)" direction="in"/>
      <arg name="q" type="au" direction="out"/>
    </method>
  </interface>
</node>
"#;

#[test]
fn method_with_struct_in_array_out() {
    let out = gen(STRUCT_IN_ARRAY_OUT);

    // A typedef for the struct argument exists.
    let decl = out.typedefs.iter().find(|t| t.name == "ComExampleTDoP").unwrap();
    assert!(decl.code.contains("int32_t item0;"));
    assert!(decl.code.contains("char *item1;"));

    // Server: demarshals the struct, then insists the iterator is done.
    let m = function(&out.code, "com_example_t_do_method");
    assert!(m.contains("p = stub_alloc (message, sizeof (ComExampleTDoP));"));
    let struct_check = m.find("DBUS_TYPE_STRUCT").unwrap();
    let int_read = m.find("p->item0").unwrap();
    let str_read = m.find("p->item1").unwrap();
    let invalid = m.find("DBUS_TYPE_INVALID").unwrap();
    let handler = m.find("com_example_t_do_handler").unwrap();
    assert!(struct_check < int_read && int_read < str_read && str_read < invalid && invalid < handler);
    assert!(m.contains("com_example_t_do_handler (object->data, message, p, &q, &q_len)"));
    assert!(m.contains("dbus_connection_send (message->connection, reply, NULL)"));

    // Client: marshals the pair in order, demarshals a counted array.
    let c = function(&out.code, "com_example_t_do_sync");
    let i0 = c.find("&p->item0").unwrap();
    let i1 = c.find("p->item1").unwrap();
    assert!(i0 < i1);
    assert!(c.contains("(*q) = stub_alloc (parent, sizeof (uint32_t));"));
    assert!(c.contains("(*q_len) = 0;"));
    assert!(c.contains("} while (! (*q));"));

    // The sync prototype takes a parent, const in, out pointer plus length.
    let p = out.prototypes.iter().find(|p| p.name == "com_example_t_do_sync").unwrap();
    let types: Vec<&str> = p.args.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        types,
        ["const void *", "StubProxy *", "const ComExampleTDoP *", "uint32_t **", "size_t *", "StubError **"]
    );

    // Handler prototype: inputs by const view, outputs by address.
    let h = out.handlers.iter().find(|h| h.name == "com_example_t_do_handler").unwrap();
    let types: Vec<&str> = h.args.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        types,
        ["void *", "StubMessage *", "const ComExampleTDoP *", "uint32_t **", "size_t *"]
    );
}

static DEPRECATED_METHOD: &str = r#"
<node>
  <interface name="com.example.T">
    <method name="Old">
      <annotation name="org.freedesktop.DBus.Deprecated" value="true"/>
    </method>
    <method name="Fresh"/>
  </interface>
</node>
"#;

#[test]
fn deprecated_decorates_client_only() {
    let opts = GenOpts { async_client: true, ..Default::default() };
    let out = generate(DEPRECATED_METHOD, &opts).unwrap();

    let find = |n: &str| out.prototypes.iter().find(|p| p.name == n).unwrap();
    let server = find("com_example_t_old_method");
    let client = find("com_example_t_old_sync");
    let client_async = find("com_example_t_old");
    let fresh = find("com_example_t_fresh_sync");

    assert!(server.has(Attribute::WarnUnusedResult) && !server.has(Attribute::Deprecated));
    assert!(client.has(Attribute::WarnUnusedResult) && client.has(Attribute::Deprecated));
    assert!(client_async.has(Attribute::Deprecated));
    assert!(fresh.has(Attribute::WarnUnusedResult) && !fresh.has(Attribute::Deprecated));

    let d = Dialect::libdbus();
    let header = out.header(&d);
    assert!(header.contains("int com_example_t_old_sync (StubProxy *proxy, StubError **error) __attribute__ ((warn_unused_result)) __attribute__ ((deprecated));"));
    assert!(header.contains("int com_example_t_old_method (StubObject *object, StubMessage *message, DBusMessageIter *iter) __attribute__ ((warn_unused_result));"));
}

static RW_PROP: &str = r#"
<node>
  <interface name="com.example.T">
    <property name="Name" type="s" access="readwrite"/>
  </interface>
</node>
"#;

#[test]
fn property_set_checks_variant_before_setter() {
    let out = gen(RW_PROP);
    let set = function(&out.code, "com_example_t_name_set_property");

    let variant_check = set.find("!= DBUS_TYPE_VARIANT").unwrap();
    let inner_check = set.find("!= DBUS_TYPE_STRING").unwrap();
    let trailing = set.find("!= DBUS_TYPE_INVALID").unwrap();
    let setter = set.find("com_example_t_name_set_handler").unwrap();
    assert!(variant_check < inner_check);
    assert!(inner_check < trailing);
    assert!(trailing < setter);
    assert!(set.contains("stub_error_raise (message, DBUS_ERROR_INVALID_ARGS, \"Invalid arguments to Name property\")"));

    // Client setter sends the value inside a variant of "s" and expects
    // an empty reply.
    let c = function(&out.code, "com_example_t_set_name_sync");
    assert!(c.contains("DBUS_INTERFACE_PROPERTIES, \"Set\""));
    assert!(c.contains("dbus_message_iter_open_container (&iter, DBUS_TYPE_VARIANT, \"s\", &variter)"));
    assert!(c.contains("if (dbus_message_iter_init (reply, &iter)) {"));
}

#[test]
fn duplicate_derived_symbols_are_rejected() {
    let e = generate(
        r#"<node><interface name="com.example.T">
             <method name="TestFoo"/>
             <method name="test_foo"/>
           </interface></node>"#,
        &GenOpts::default(),
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

static KITCHEN_SINK: &str = r#"
<node>
  <interface name="com.example.Sink">
    <method name="Everything">
      <arg name="b" type="y" direction="in"/>
      <arg name="strs" type="as" direction="in"/>
      <arg name="map" type="a{sv}" direction="in"/>
      <arg name="pairs" type="a(ias)" direction="in"/>
      <arg name="nested" type="aau" direction="out"/>
      <arg name="result" type="(d(sb))" direction="out"/>
    </method>
    <signal name="Changed">
      <arg name="what" type="s"/>
      <arg name="values" type="au"/>
    </signal>
    <property name="Levels" type="ad" access="readwrite"/>
    <property name="Tag" type="v" access="read"/>
  </interface>
</node>
"#;

#[test]
fn containers_stay_balanced_everywhere() {
    let opts = GenOpts { async_client: true, ..Default::default() };
    let out = generate(KITCHEN_SINK, &opts).unwrap();
    let opens = out.code.matches("_open_container (").count();
    let closes = out.code.matches("_close_container (").count();
    assert!(opens > 0);
    assert_eq!(opens, closes);
}

#[test]
fn generated_names_are_unique() {
    let opts = GenOpts { async_client: true, ..Default::default() };
    let out = generate(KITCHEN_SINK, &opts).unwrap();
    let mut names: Vec<&str> = out
        .prototypes
        .iter()
        .chain(out.handlers.iter())
        .map(|p| p.name.as_str())
        .collect();
    names.sort_unstable();
    let n = names.len();
    names.dedup();
    assert_eq!(n, names.len());

    let mut tnames: Vec<&str> = out.typedefs.iter().map(|t| t.name.as_str()).collect();
    tnames.sort_unstable();
    let n = tnames.len();
    tnames.dedup();
    assert_eq!(n, tnames.len());
}

#[test]
fn regeneration_is_byte_identical() {
    let opts = GenOpts { async_client: true, command_line: "--async-calls".into(), ..Default::default() };
    let a = generate(KITCHEN_SINK, &opts).unwrap();
    let b = generate(KITCHEN_SINK, &opts).unwrap();
    assert_eq!(a.code, b.code);
    assert_eq!(a.header(&Dialect::libdbus()), b.header(&Dialect::libdbus()));
}

#[test]
fn async_pair_has_notify_and_cancellation_by_release() {
    let opts = GenOpts { async_client: true, ..Default::default() };
    let out = generate(STRUCT_IN_ARRAY_OUT, &opts).unwrap();

    let notify = function(&out.code, "com_example_t_do_notify");
    assert!(out.code.contains("static void\ncom_example_t_do_notify (DBusPendingCall *pending_call, StubPendingData *pending_data)"));
    assert!(notify.contains("dbus_pending_call_steal_reply (pending_call)"));
    assert!(notify.contains("((ComExampleTDoReply) pending_data->handler) (pending_data->data, message, q, q_len);"));

    let caller = function(&out.code, "com_example_t_do");
    assert!(caller.contains("dbus_connection_send_with_reply (proxy->connection, method_call, &pending_call, proxy->timeout)"));
    assert!(caller.contains("dbus_pending_call_set_notify (pending_call, (DBusPendingCallNotifyFunction) com_example_t_do_notify, pending_data, (DBusFreeFunction) stub_pending_data_free)"));
    assert!(caller.contains("return pending_call;"));

    // The notify function is internal; only the caller-facing function
    // is in the prototype list.
    assert!(out.prototypes.iter().any(|p| p.name == "com_example_t_do"));
    assert!(!out.prototypes.iter().any(|p| p.name == "com_example_t_do_notify"));

    // The reply callback typedef is exported.
    let t = out.typedefs.iter().find(|t| t.name == "ComExampleTDoReply").unwrap();
    assert!(t.code.contains("typedef void (*ComExampleTDoReply) (void *data, StubMessage *message, const uint32_t *q, size_t q_len);"));
}

#[test]
fn skipprefix_and_filter() {
    let xml = r#"<node>
      <interface name="com.example.A"><method name="M"/></interface>
      <interface name="com.example.B"><method name="M"/></interface>
    </node>"#;
    let opts = GenOpts {
        skipprefix: Some("com.example.".into()),
        interfaces: Some(["com.example.B".to_string()].iter().cloned().collect()),
        ..Default::default()
    };
    let out = generate(xml, &opts).unwrap();
    assert!(out.code.contains("b_m_method"));
    assert!(!out.code.contains("a_m_method"));
}

fn render(w: &Walker) -> String {
    let mut w = w.clone();
    let mut s = String::new();
    while let Some(tok) = w.current().unwrap() {
        match tok {
            Token::Basic(b) => s.push(b.code()),
            Token::Variant => s.push('v'),
            Token::Array(e) => {
                s.push('a');
                s.push_str(&render(&e));
            }
            Token::Struct(f) => {
                s.push('(');
                s.push_str(&render(&f));
                s.push(')');
            }
            Token::DictEntry(kv) => {
                s.push('{');
                s.push_str(&render(&kv));
                s.push('}');
            }
        }
        w.advance().unwrap();
    }
    s
}

#[test]
fn walker_reconstructs_signatures() {
    for sig in &["", "i", "v", "as", "a{sv}", "(isau)", "aau", "a{o(ii)}", "(d(sb))", "sa{sv}u"] {
        assert_eq!(render(&Walker::new(sig)), *sig, "for {}", sig);
    }
    assert!(matches!(Basic::from_code('i'), Some(Basic::Int32)));
}

mod quickchecks {
    use super::render;
    use dbus_stubgen::signature::{validate_single, Walker};
    use quickcheck::{Arbitrary, Gen};
    use rand::Rng;

    const BASIC: &[char] = &['y', 'b', 'n', 'q', 'i', 'u', 'x', 't', 'd', 's', 'o', 'g', 'h'];

    #[derive(Clone, Debug)]
    struct ValidSig(String);

    fn gen_sig<G: Gen>(g: &mut G, depth: u8) -> String {
        let choice = if depth >= 3 { 0 } else { g.gen_range(0, 7) };
        match choice {
            0 | 1 => BASIC[g.gen_range(0, BASIC.len())].to_string(),
            2 => "v".to_string(),
            3 | 4 => format!("a{}", gen_sig(g, depth + 1)),
            5 => {
                let n = g.gen_range(1, 4);
                let fields: String = (0..n).map(|_| gen_sig(g, depth + 1)).collect();
                format!("({})", fields)
            }
            _ => format!(
                "a{{{}{}}}",
                BASIC[g.gen_range(0, BASIC.len())],
                gen_sig(g, depth + 1)
            ),
        }
    }

    impl Arbitrary for ValidSig {
        fn arbitrary<G: Gen>(g: &mut G) -> Self {
            ValidSig(gen_sig(g, 0))
        }
    }

    #[test]
    fn generated_signatures_validate_and_roundtrip() {
        fn prop(s: ValidSig) -> bool {
            validate_single(&s.0).is_ok() && render(&Walker::new(&s.0)) == s.0
        }
        quickcheck::quickcheck(prop as fn(ValidSig) -> bool);
    }
}
