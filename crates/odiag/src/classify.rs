//! Decides once, per value, how the explorers treat it.

use std::fmt;

use odiag_remote::{
    AsyncRemoteAccess, FieldValue, ObjectRef, RemoteError, RemoteValue, ValueReader,
};

pub const STRING_TYPE: &str = "java.lang.String";

/// Wrapper types unwrapped into attributes, with the primitive they box.
pub const BOXED_WRAPPERS: [(&str, &str); 8] = [
    ("java.lang.Boolean", "boolean"),
    ("java.lang.Byte", "byte"),
    ("java.lang.Character", "char"),
    ("java.lang.Short", "short"),
    ("java.lang.Integer", "int"),
    ("java.lang.Long", "long"),
    ("java.lang.Float", "float"),
    ("java.lang.Double", "double"),
];

const COLLECTION_INTERFACES: [&str; 2] = ["java.util.List", "java.util.Set"];
const MAP_INTERFACE: &str = "java.util.Map";

/// Field of a wrapper type holding the boxed value.
const WRAPPER_VALUE_FIELD: &str = "value";

pub fn is_boxed_wrapper(type_name: &str) -> bool {
    BOXED_WRAPPERS.iter().any(|(wrapper, _)| *wrapper == type_name)
}

/// Containers are only rendered generically for JDK implementations; a user
/// type implementing `List` is still walked field by field.
pub fn is_standard_library_type(type_name: &str) -> bool {
    type_name.starts_with("java.util.")
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Primitive {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(u16),
    Void,
}

impl Primitive {
    pub fn from_remote(value: &RemoteValue) -> Option<Self> {
        Some(match *value {
            RemoteValue::Boolean(v) => Self::Boolean(v),
            RemoteValue::Byte(v) => Self::Byte(v),
            RemoteValue::Short(v) => Self::Short(v),
            RemoteValue::Int(v) => Self::Int(v),
            RemoteValue::Long(v) => Self::Long(v),
            RemoteValue::Float(v) => Self::Float(v),
            RemoteValue::Double(v) => Self::Double(v),
            RemoteValue::Char(v) => Self::Char(v),
            RemoteValue::Void => Self::Void,
            RemoteValue::Null | RemoteValue::Object(_) => return None,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Char(_) => "char",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write_float(f, v),
            Self::Double(v) => write_float(f, v),
            Self::Char(unit) => match char::from_u32(u32::from(unit)) {
                Some(ch) => write!(f, "'{ch}'"),
                // Lone surrogate half.
                None => write!(f, "'\\u{unit:04X}'"),
            },
            Self::Void => f.write_str("void"),
        }
    }
}

/// Shortest round-trip digits in Java's `Double.toString` layout: plain
/// decimal for magnitudes in `[1e-3, 1e7)`, `d.dddE±n` outside it. Both
/// layouts keep at least one fractional digit.
fn write_float<T>(f: &mut fmt::Formatter<'_>, value: T) -> fmt::Result
where
    T: fmt::Debug + fmt::LowerExp + Copy + Into<f64>,
{
    let wide: f64 = value.into();
    if wide.is_nan() {
        return f.write_str("NaN");
    }
    if wide.is_infinite() {
        return f.write_str(if wide > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if wide == 0.0 || (1e-3..1e7).contains(&wide.abs()) {
        return write!(f, "{value:?}");
    }

    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    if mantissa.contains('.') {
        write!(f, "{mantissa}E{exponent}")
    } else {
        write!(f, "{mantissa}.0E{exponent}")
    }
}

/// The closed set of value shapes the explorers distinguish.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Primitive(Primitive),
    BoxedPrimitive { wrapper: ObjectRef, inner: Primitive },
    StringLiteral(String),
    Array(ObjectRef),
    Collection(ObjectRef),
    Map(ObjectRef),
    PlainObject(ObjectRef),
}

impl ValueKind {
    /// Display text for values that become attributes rather than nodes.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Self::Null => Some("null".to_string()),
            Self::Primitive(value) => Some(value.to_string()),
            Self::BoxedPrimitive { inner, .. } => Some(inner.to_string()),
            Self::StringLiteral(text) => Some(format!("\"{text}\"")),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<&ObjectRef> {
        match self {
            Self::BoxedPrimitive { wrapper: obj, .. }
            | Self::Array(obj)
            | Self::Collection(obj)
            | Self::Map(obj)
            | Self::PlainObject(obj) => Some(obj),
            Self::Null | Self::Primitive(_) | Self::StringLiteral(_) => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar_text().is_some()
    }
}

/// First step shared by every classifier: what can be decided from the value
/// alone, and which single read finishes the job otherwise.
enum Peek<'v> {
    Done(ValueKind),
    String(&'v ObjectRef),
    Boxed(&'v ObjectRef),
    Object(&'v ObjectRef),
}

fn peek(value: &RemoteValue) -> Peek<'_> {
    match value {
        RemoteValue::Null => Peek::Done(ValueKind::Null),
        RemoteValue::Object(obj) if obj.runtime_type == STRING_TYPE => Peek::String(obj),
        RemoteValue::Object(obj) if is_boxed_wrapper(&obj.runtime_type) => Peek::Boxed(obj),
        RemoteValue::Object(obj) => Peek::Object(obj),
        other => match Primitive::from_remote(other) {
            Some(primitive) => Peek::Done(ValueKind::Primitive(primitive)),
            None => Peek::Done(ValueKind::Null),
        },
    }
}

fn unwrap_boxed(wrapper: &ObjectRef, fields: Vec<FieldValue>) -> ValueKind {
    let inner = fields
        .into_iter()
        .find(|field| field.name == WRAPPER_VALUE_FIELD && !field.is_static)
        .and_then(|field| Primitive::from_remote(&field.value));
    match inner {
        Some(inner) => ValueKind::BoxedPrimitive {
            wrapper: wrapper.clone(),
            inner,
        },
        None => {
            tracing::warn!(
                target: "odiag.explore",
                object = %wrapper,
                "unsupported value shape: wrapper without primitive `value` field; treating as plain object"
            );
            ValueKind::PlainObject(wrapper.clone())
        }
    }
}

/// Full classification, used by the synchronous explorer.
///
/// Reads at most one of: the string contents, the wrapper fields, or the
/// interface list. Never invokes a method.
pub fn classify<R>(reader: &mut R, value: &RemoteValue) -> Result<ValueKind, RemoteError>
where
    R: ValueReader + ?Sized,
{
    let object = match peek(value) {
        Peek::Done(kind) => return Ok(kind),
        Peek::String(obj) => return Ok(ValueKind::StringLiteral(reader.string_value(obj)?)),
        Peek::Boxed(obj) => return Ok(unwrap_boxed(obj, reader.fields(obj)?)),
        Peek::Object(obj) => obj,
    };

    if object.runtime_type.ends_with("[]") {
        return Ok(ValueKind::Array(object.clone()));
    }
    if !is_standard_library_type(&object.runtime_type) {
        return Ok(ValueKind::PlainObject(object.clone()));
    }

    let interfaces = reader.interfaces(object)?;
    let implements = |name: &str| interfaces.iter().any(|iface| iface == name);
    if COLLECTION_INTERFACES.iter().any(|iface| implements(iface)) {
        Ok(ValueKind::Collection(object.clone()))
    } else if implements(MAP_INTERFACE) {
        Ok(ValueKind::Map(object.clone()))
    } else {
        Ok(ValueKind::PlainObject(object.clone()))
    }
}

/// Scalars are decided exactly as [`classify`]; every other object is reported
/// as [`ValueKind::PlainObject`] without reading its interfaces.
pub fn classify_shallow<R>(reader: &mut R, value: &RemoteValue) -> Result<ValueKind, RemoteError>
where
    R: ValueReader + ?Sized,
{
    Ok(match peek(value) {
        Peek::Done(kind) => kind,
        Peek::String(obj) => ValueKind::StringLiteral(reader.string_value(obj)?),
        Peek::Boxed(obj) => unwrap_boxed(obj, reader.fields(obj)?),
        Peek::Object(obj) => ValueKind::PlainObject(obj.clone()),
    })
}

/// [`classify_shallow`] over the asynchronous facade. The host expands arrays
/// and containers itself, so they stay plain objects here.
pub fn classify_scalar<A>(remote: &A, value: &RemoteValue) -> Result<ValueKind, RemoteError>
where
    A: AsyncRemoteAccess + ?Sized,
{
    Ok(match peek(value) {
        Peek::Done(kind) => kind,
        Peek::String(obj) => ValueKind::StringLiteral(remote.string_value(obj)?),
        Peek::Boxed(obj) => unwrap_boxed(obj, remote.fields(obj)?),
        Peek::Object(obj) => ValueKind::PlainObject(obj.clone()),
    })
}
