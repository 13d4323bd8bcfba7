//! Description of the emitted target language.
//!
//! The walker, type mapping and marshalling engines never hard-code the
//! names of the support runtime; everything they emit goes through this
//! descriptor, so a different support library (or a different C-like
//! target) is a matter of constructing another `Dialect`.

use crate::signature::Basic;

/// Attributes attached to generated prototypes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Attribute {
    WarnUnusedResult,
    Deprecated,
}

/// Container classes of the wire format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Container {
    Array,
    Struct,
    DictEntry,
    Variant,
}

pub struct Dialect {
    /// Return type and values of generated fallible functions.
    pub result_type: &'static str,
    pub ok: &'static str,
    pub fail: &'static str,

    /// Runtime types the generated code is written against.
    pub iter_type: &'static str,
    pub object_type: &'static str,
    pub message_type: &'static str,
    pub proxy_type: &'static str,
    pub error_type: &'static str,
    pub variant_type: &'static str,
    pub len_type: &'static str,

    /// Parented allocator entry points.
    pub alloc_fn: &'static str,
    pub strdup_fn: &'static str,
    pub realloc_fn: &'static str,
    pub discard_fn: &'static str,

    /// Error constructors.
    pub error_raise_fn: &'static str,
    pub error_set_fn: &'static str,
    pub error_set_no_memory_fn: &'static str,
    pub error_set_remote_fn: &'static str,
    pub err_no_memory: &'static str,
    pub err_invalid_args: &'static str,
    pub err_code_invalid_args: &'static str,
    pub err_code_disconnected: &'static str,

    /// Runtime helpers for values whose type is only known on the wire.
    pub variant_marshal_fn: &'static str,
    pub variant_demarshal_fn: &'static str,

    /// Message-context helpers used by the async dispatch path.
    pub message_new_fn: &'static str,
    pub message_free_fn: &'static str,
    pub pending_data_type: &'static str,
    pub pending_data_new_fn: &'static str,
    pub pending_data_free_fn: &'static str,
    pub reply_handler_cast: &'static str,
    pub error_handler_type: &'static str,

    /// Attribute spellings.
    pub attr_warn_unused: &'static str,
    pub attr_deprecated: &'static str,
}

impl Dialect {
    /// The shipped dialect: C over libdbus with the `stub_` support
    /// runtime.
    pub fn libdbus() -> Dialect {
        Dialect {
            result_type: "int",
            ok: "0",
            fail: "-1",

            iter_type: "DBusMessageIter",
            object_type: "StubObject",
            message_type: "StubMessage",
            proxy_type: "StubProxy",
            error_type: "StubError",
            variant_type: "StubVariant",
            len_type: "size_t",

            alloc_fn: "stub_alloc",
            strdup_fn: "stub_strdup",
            realloc_fn: "stub_realloc",
            discard_fn: "stub_discard",

            error_raise_fn: "stub_error_raise",
            error_set_fn: "stub_error_set",
            error_set_no_memory_fn: "stub_error_set_no_memory",
            error_set_remote_fn: "stub_error_set_remote",
            err_no_memory: "DBUS_ERROR_NO_MEMORY",
            err_invalid_args: "DBUS_ERROR_INVALID_ARGS",
            err_code_invalid_args: "STUB_ERROR_INVALID_ARGS",
            err_code_disconnected: "STUB_ERROR_DISCONNECTED",

            variant_marshal_fn: "stub_variant_marshal",
            variant_demarshal_fn: "stub_variant_demarshal",

            message_new_fn: "stub_message_new",
            message_free_fn: "stub_message_free",
            pending_data_type: "StubPendingData",
            pending_data_new_fn: "stub_pending_data_new",
            pending_data_free_fn: "stub_pending_data_free",
            reply_handler_cast: "StubReplyHandler",
            error_handler_type: "StubErrorHandler",

            attr_warn_unused: "__attribute__ ((warn_unused_result))",
            attr_deprecated: "__attribute__ ((deprecated))",
        }
    }

    /// Natural C value type of a basic D-Bus type.
    pub fn basic_value_type(&self, b: Basic) -> &'static str {
        match b {
            Basic::Byte => "uint8_t",
            Basic::Boolean => "int",
            Basic::Int16 => "int16_t",
            Basic::UInt16 => "uint16_t",
            Basic::Int32 => "int32_t",
            Basic::UInt32 => "uint32_t",
            Basic::Int64 => "int64_t",
            Basic::UInt64 => "uint64_t",
            Basic::Double => "double",
            Basic::String | Basic::ObjectPath | Basic::Signature => "char *",
            Basic::UnixFd => "int",
        }
    }

    /// libdbus type constant for a basic type.
    pub fn basic_constant(&self, b: Basic) -> &'static str {
        match b {
            Basic::Byte => "DBUS_TYPE_BYTE",
            Basic::Boolean => "DBUS_TYPE_BOOLEAN",
            Basic::Int16 => "DBUS_TYPE_INT16",
            Basic::UInt16 => "DBUS_TYPE_UINT16",
            Basic::Int32 => "DBUS_TYPE_INT32",
            Basic::UInt32 => "DBUS_TYPE_UINT32",
            Basic::Int64 => "DBUS_TYPE_INT64",
            Basic::UInt64 => "DBUS_TYPE_UINT64",
            Basic::Double => "DBUS_TYPE_DOUBLE",
            Basic::String => "DBUS_TYPE_STRING",
            Basic::ObjectPath => "DBUS_TYPE_OBJECT_PATH",
            Basic::Signature => "DBUS_TYPE_SIGNATURE",
            Basic::UnixFd => "DBUS_TYPE_UNIX_FD",
        }
    }

    /// libdbus type constant for a container class.
    pub fn container_constant(&self, c: Container) -> &'static str {
        match c {
            Container::Array => "DBUS_TYPE_ARRAY",
            Container::Struct => "DBUS_TYPE_STRUCT",
            Container::DictEntry => "DBUS_TYPE_DICT_ENTRY",
            Container::Variant => "DBUS_TYPE_VARIANT",
        }
    }

    /// Constant returned by `get_arg_type` past the last argument.
    pub fn invalid_constant(&self) -> &'static str {
        "DBUS_TYPE_INVALID"
    }

    pub fn get_arg_type(&self, iter: &str) -> String {
        format!("dbus_message_iter_get_arg_type ({})", iter)
    }

    pub fn get_basic(&self, iter: &str, out: &str) -> String {
        format!("dbus_message_iter_get_basic ({}, {});", iter, out)
    }

    pub fn append_basic(&self, iter: &str, constant: &str, addr: &str) -> String {
        format!("dbus_message_iter_append_basic ({}, {}, {})", iter, constant, addr)
    }

    pub fn open_container(&self, iter: &str, constant: &str, sig: &str, sub: &str) -> String {
        format!("dbus_message_iter_open_container ({}, {}, {}, {})", iter, constant, sig, sub)
    }

    pub fn close_container(&self, iter: &str, sub: &str) -> String {
        format!("dbus_message_iter_close_container ({}, {})", iter, sub)
    }

    pub fn abandon_container(&self, iter: &str, sub: &str) -> String {
        format!("dbus_message_iter_abandon_container ({}, {});", iter, sub)
    }

    pub fn recurse(&self, iter: &str, sub: &str) -> String {
        format!("dbus_message_iter_recurse ({}, {});", iter, sub)
    }

    pub fn next(&self, iter: &str) -> String {
        format!("dbus_message_iter_next ({});", iter)
    }

    pub fn attribute(&self, a: Attribute) -> &'static str {
        match a {
            Attribute::WarnUnusedResult => self.attr_warn_unused,
            Attribute::Deprecated => self.attr_deprecated,
        }
    }
}
