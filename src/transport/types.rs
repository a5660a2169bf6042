// Transportable payload types
#![allow(dead_code)]

use crate::transport::codec::{PayloadKind, decode_payload, encode_payload};
use crate::transport::error::Result;
use crate::transport::registry::{FunctionRegistry, ResolvedFunction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A serialized value passed across the host/executor boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportableObject {
    bytes: Vec<u8>,
}

impl TransportableObject {
    /// Serialize a value into a transportable object
    pub fn new(value: &impl Serialize) -> Result<Self> {
        Ok(Self {
            bytes: encode_payload(PayloadKind::Object, value)?,
        })
    }

    /// Wrap raw bytes received from the host; validated on deserialization
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reconstruct the value in the current environment
    pub fn get_deserialized<T: DeserializeOwned>(&self) -> Result<T> {
        decode_payload(PayloadKind::Object, &self.bytes)
    }
}

/// Reference to a function, resolved against the functions
/// available where the executor runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableRef {
    /// Registered function name
    pub name: String,
    /// Optional module/namespace the function came from
    #[serde(default)]
    pub module: Option<String>,
}

/// A serialized function reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportableCallable {
    bytes: Vec<u8>,
}

impl TransportableCallable {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::from_ref(&CallableRef {
            name: name.into(),
            module: None,
        })
    }

    pub fn from_ref(callable: &CallableRef) -> Result<Self> {
        Ok(Self {
            bytes: encode_payload(PayloadKind::Callable, callable)?,
        })
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the function reference without resolving it
    pub fn callable_ref(&self) -> Result<CallableRef> {
        decode_payload(PayloadKind::Callable, &self.bytes)
    }

    /// Decode and resolve the function in the given environment
    pub fn get_deserialized(&self, environment: &FunctionRegistry) -> Result<ResolvedFunction> {
        let callable = self.callable_ref()?;
        environment.resolve(&callable.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use serde_json::Value;

    #[test]
    fn test_object_get_deserialized() {
        let object = TransportableObject::new(&vec![1, 2, 3]).unwrap();
        let values: Vec<i64> = object.get_deserialized().unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_callable_is_not_an_object() {
        let callable = TransportableCallable::new("simple_task").unwrap();
        let object = TransportableObject::from_bytes(callable.as_bytes().to_vec());

        assert!(matches!(
            object.get_deserialized::<Value>().unwrap_err(),
            TransportError::KindMismatch { .. }
        ));
    }

    #[test]
    fn test_callable_missing_dependency() {
        let environment = FunctionRegistry::new();
        let callable = TransportableCallable::new("not_installed").unwrap();

        let err = callable.get_deserialized(&environment).unwrap_err();
        assert!(matches!(
            err,
            TransportError::MissingDependency(ref name) if name == "not_installed"
        ));
    }

    #[test]
    fn test_callable_resolves() {
        let environment = FunctionRegistry::new();
        environment.register("identity", |_ctx, args, _kwargs| {
            Ok(args.first().cloned().unwrap_or(Value::Null))
        });

        let callable = TransportableCallable::new("identity").unwrap();
        assert_eq!(callable.callable_ref().unwrap().name, "identity");

        let resolved = callable.get_deserialized(&environment).unwrap();
        assert_eq!(resolved.name(), "identity");
    }
}
