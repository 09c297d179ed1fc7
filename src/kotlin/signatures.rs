//! JVM signatures of the declarations listed in metadata.
//!
//! Functions, constructors and properties carry an optional JVM signature extension. When
//! the extension leaves out the descriptor it is rebuilt from the declared parameter and
//! return types, mapping Kotlin class ids onto their JVM counterparts.

use std::{collections::HashMap, sync::OnceLock};

use crate::{
    elements::{FieldElement, MethodElement, FIELD_EXTENSION},
    kotlin::{fields, protobuf::RawMessage, strings::NameResolver},
    Result,
};

/// Map a Kotlin class id onto a JVM type descriptor.
///
/// Builtins map onto primitives or their `java.lang`/`java.util` equivalents; anything else
/// becomes a reference type with nested classes joined by `$`.
#[must_use]
pub fn map_class(class_id: &str) -> String {
    builtins()
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("L{};", class_id.replace('.', "$")))
}

fn builtins() -> &'static HashMap<String, String> {
    static BUILTINS: OnceLock<HashMap<String, String>> = OnceLock::new();
    BUILTINS.get_or_init(|| {
        let mut map = HashMap::new();
        let mut add = |kotlin: String, java: &str| {
            map.insert(format!("kotlin/{kotlin}"), format!("L{java};"));
        };

        add("Any".into(), "java/lang/Object");
        add("Nothing".into(), "java/lang/Void");
        add("Annotation".into(), "java/lang/annotation/Annotation");
        for class in [
            "String",
            "CharSequence",
            "Throwable",
            "Cloneable",
            "Number",
            "Comparable",
            "Enum",
        ] {
            add(class.into(), &format!("java/lang/{class}"));
        }
        for class in ["Iterator", "Collection", "List", "Set", "Map", "ListIterator"] {
            add(format!("collections/{class}"), &format!("java/util/{class}"));
            add(format!("collections/Mutable{class}"), &format!("java/util/{class}"));
        }
        add("collections/Iterable".into(), "java/lang/Iterable");
        add("collections/MutableIterable".into(), "java/lang/Iterable");
        add("collections/Map.Entry".into(), "java/util/Map$Entry");
        add("collections/MutableMap.MutableEntry".into(), "java/util/Map$Entry");
        for arity in 0..=22 {
            add(
                format!("Function{arity}"),
                &format!("kotlin/jvm/functions/Function{arity}"),
            );
            add(format!("reflect/KFunction{arity}"), "kotlin/reflect/KFunction");
        }
        for class in [
            "Char", "Byte", "Short", "Int", "Float", "Long", "Double", "String", "Enum",
        ] {
            add(
                format!("{class}.Companion"),
                &format!("kotlin/jvm/internal/{class}CompanionObject"),
            );
        }

        for (kotlin, jvm) in [
            ("Boolean", "Z"),
            ("Char", "C"),
            ("Byte", "B"),
            ("Short", "S"),
            ("Int", "I"),
            ("Float", "F"),
            ("Long", "J"),
            ("Double", "D"),
        ] {
            map.insert(format!("kotlin/{kotlin}"), jvm.to_string());
            map.insert(format!("kotlin/{kotlin}Array"), format!("[{jvm}"));
        }
        map.insert("kotlin/Unit".to_string(), "V".to_string());
        map
    })
}

/// Shared `Type` messages referenced by id.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Vec<RawMessage>,
}

impl TypeTable {
    /// Read the type table from field 30 of a class, package or function message.
    ///
    /// # Errors
    /// Returns an error if the table does not decode.
    pub fn of(message: &RawMessage) -> Result<Option<Self>> {
        let Some(table) = message.message(fields::TYPE_TABLE)? else {
            return Ok(None);
        };
        Ok(Some(TypeTable {
            types: table.messages(fields::TYPE_TABLE_TYPE)?,
        }))
    }

    fn get(&self, id: i32) -> Option<&RawMessage> {
        usize::try_from(id).ok().and_then(|id| self.types.get(id))
    }
}

/// Resolve a type given inline under `field` or by id under `id_field`.
fn resolve_type(
    message: &RawMessage,
    field: u32,
    id_field: u32,
    types: Option<&TypeTable>,
) -> Result<Option<RawMessage>> {
    if let Some(ty) = message.message(field)? {
        return Ok(Some(ty));
    }
    match (message.int32(id_field)?, types) {
        (Some(id), Some(types)) => Ok(types.get(id).cloned()),
        _ => Ok(None),
    }
}

/// Descriptor of a type that names a class; `None` for type parameters and the like.
fn map_type(ty: Option<&RawMessage>, resolver: &NameResolver<'_>) -> Result<Option<String>> {
    let Some(ty) = ty else {
        return Ok(None);
    };
    match ty.int32(fields::TYPE_CLASS_NAME)? {
        Some(class_name) => Ok(Some(map_class(&resolver.qualified_class_name(class_name)?))),
        None => Ok(None),
    }
}

/// The explicit name and descriptor of a `JvmMethodSignature`, each optional.
fn method_signature(
    signature: Option<&RawMessage>,
    resolver: &NameResolver<'_>,
) -> Result<(Option<String>, Option<String>)> {
    let Some(signature) = signature else {
        return Ok((None, None));
    };
    let name = signature
        .int32(fields::SIGNATURE_NAME)?
        .map(|index| resolver.string(index))
        .transpose()?;
    let desc = signature
        .int32(fields::SIGNATURE_DESC)?
        .map(|index| resolver.string(index))
        .transpose()?;
    Ok((name, desc))
}

fn parameter_descriptors(
    parameters: &[RawMessage],
    resolver: &NameResolver<'_>,
    types: Option<&TypeTable>,
) -> Result<Option<String>> {
    let mut desc = String::new();
    for parameter in parameters {
        let ty = resolve_type(
            parameter,
            fields::PARAMETER_TYPE,
            fields::PARAMETER_TYPE_ID,
            types,
        )?;
        match map_type(ty.as_ref(), resolver)? {
            Some(mapped) => desc.push_str(&mapped),
            None => return Ok(None),
        }
    }
    Ok(Some(desc))
}

/// The JVM method behind a `Function` message, if it can be determined.
///
/// # Errors
/// Returns an error if the message or one of its string indices is malformed.
pub fn function_signature(
    function: &RawMessage,
    resolver: &NameResolver<'_>,
    types: Option<&TypeTable>,
) -> Result<Option<MethodElement>> {
    let own_types = TypeTable::of(function)?;
    let types = own_types.as_ref().or(types);

    let signature = function.message(fields::JVM_SIGNATURE)?;
    let (name, desc) = method_signature(signature.as_ref(), resolver)?;
    let name = match name {
        Some(name) => name,
        None => match function.int32(fields::FUNCTION_NAME)? {
            Some(index) => resolver.string(index)?,
            None => return Ok(None),
        },
    };

    let desc = match desc {
        Some(desc) => desc,
        None => {
            let receiver = resolve_type(
                function,
                fields::FUNCTION_RECEIVER_TYPE,
                fields::FUNCTION_RECEIVER_TYPE_ID,
                types,
            )?;
            let receiver = match receiver {
                Some(receiver) => match map_type(Some(&receiver), resolver)? {
                    Some(mapped) => mapped,
                    None => return Ok(None),
                },
                None => String::new(),
            };
            let parameters = function.messages(fields::FUNCTION_VALUE_PARAMETER)?;
            let Some(parameters) = parameter_descriptors(&parameters, resolver, types)? else {
                return Ok(None);
            };
            let ret = resolve_type(
                function,
                fields::FUNCTION_RETURN_TYPE,
                fields::FUNCTION_RETURN_TYPE_ID,
                types,
            )?;
            let Some(ret) = map_type(ret.as_ref(), resolver)? else {
                return Ok(None);
            };
            format!("({receiver}{parameters}){ret}")
        }
    };

    Ok(Some(MethodElement::new(name, desc)))
}

/// The JVM constructor behind a `Constructor` message, if it can be determined.
///
/// # Errors
/// Returns an error if the message or one of its string indices is malformed.
pub fn constructor_signature(
    constructor: &RawMessage,
    resolver: &NameResolver<'_>,
    types: Option<&TypeTable>,
) -> Result<Option<MethodElement>> {
    let signature = constructor.message(fields::JVM_SIGNATURE)?;
    let (name, desc) = method_signature(signature.as_ref(), resolver)?;
    let name = name.unwrap_or_else(|| "<init>".to_string());
    let desc = match desc {
        Some(desc) => desc,
        None => {
            let parameters = constructor.messages(fields::CONSTRUCTOR_VALUE_PARAMETER)?;
            match parameter_descriptors(&parameters, resolver, types)? {
                Some(parameters) => format!("({parameters})V"),
                None => return Ok(None),
            }
        }
    };
    Ok(Some(MethodElement::new(name, desc)))
}

/// The JVM members behind a `Property` message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMembers {
    /// Kotlin name of the property
    pub name: String,
    /// Backing field, keyed by the receiver type for extension properties
    pub field: Option<FieldElement>,
    /// Getter method, absent for properties accessed through their field
    pub getter: Option<MethodElement>,
    /// Setter method of a mutable property
    pub setter: Option<MethodElement>,
    /// Synthetic method holding the property's annotations
    pub holder: Option<MethodElement>,
}

/// Resolve the JVM members of a `Property` message. Properties without a JVM signature
/// extension have no known members, and only a signature with a field entry has a backing
/// field.
///
/// # Errors
/// Returns an error if the message or one of its string indices is malformed.
pub fn property_members(
    property: &RawMessage,
    resolver: &NameResolver<'_>,
    types: Option<&TypeTable>,
) -> Result<PropertyMembers> {
    let name = match property.int32(fields::PROPERTY_NAME)? {
        Some(index) => resolver.string(index)?,
        None => String::new(),
    };
    let Some(signature) = property.message(fields::JVM_SIGNATURE)? else {
        return Ok(PropertyMembers {
            name,
            ..PropertyMembers::default()
        });
    };

    let accessor = |number| -> Result<Option<MethodElement>> {
        let message = signature.message(number)?;
        match method_signature(message.as_ref(), resolver)? {
            (Some(name), Some(desc)) => Ok(Some(MethodElement::new(name, desc))),
            _ => Ok(None),
        }
    };
    let getter = accessor(fields::PROPERTY_SIGNATURE_GETTER)?;
    let setter = accessor(fields::PROPERTY_SIGNATURE_SETTER)?;
    let holder = accessor(fields::PROPERTY_SIGNATURE_SYNTHETIC)?;

    let receiver = resolve_type(
        property,
        fields::PROPERTY_RECEIVER_TYPE,
        fields::PROPERTY_RECEIVER_TYPE_ID,
        types,
    )?;
    let extension = match map_type(receiver.as_ref(), resolver)? {
        Some(receiver) => format!("({receiver})"),
        None => FIELD_EXTENSION.to_string(),
    };

    let field_signature = signature.message(fields::PROPERTY_SIGNATURE_FIELD)?;
    let (field_name, field_desc) = method_signature(field_signature.as_ref(), resolver)?;
    let field_desc = match (&field_signature, field_desc) {
        (None, _) => None,
        (Some(_), Some(desc)) => Some(desc),
        (Some(_), None) => {
            let ret = resolve_type(
                property,
                fields::PROPERTY_RETURN_TYPE,
                fields::PROPERTY_RETURN_TYPE_ID,
                types,
            )?;
            map_type(ret.as_ref(), resolver)?
        }
    };
    let field = field_desc.map(|desc| {
        let name = field_name.clone().unwrap_or_else(|| name.clone());
        let mut field = FieldElement::inferred(name, extension.clone());
        field.set_descriptor(&desc);
        field
    });

    Ok(PropertyMembers {
        name,
        field,
        getter,
        setter,
        holder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kotlin::strings::StringTableTypes;

    #[test]
    fn test_map_class() {
        assert_eq!(map_class("kotlin/Int"), "I");
        assert_eq!(map_class("kotlin/IntArray"), "[I");
        assert_eq!(map_class("kotlin/Unit"), "V");
        assert_eq!(map_class("kotlin/Any"), "Ljava/lang/Object;");
        assert_eq!(map_class("kotlin/collections/MutableList"), "Ljava/util/List;");
        assert_eq!(map_class("kotlin/collections/Map.Entry"), "Ljava/util/Map$Entry;");
        assert_eq!(
            map_class("kotlin/Function2"),
            "Lkotlin/jvm/functions/Function2;"
        );
        assert_eq!(
            map_class("kotlin/reflect/KFunction1"),
            "Lkotlin/reflect/KFunction;"
        );
        assert_eq!(
            map_class("kotlin/Int.Companion"),
            "Lkotlin/jvm/internal/IntCompanionObject;"
        );
        assert_eq!(map_class("com/example/Outer.Inner"), "Lcom/example/Outer$Inner;");
    }

    fn class_type(index: i32) -> RawMessage {
        RawMessage::new().with_int32(fields::TYPE_CLASS_NAME, index)
    }

    #[test]
    fn test_function_signature_from_types() {
        let strings: Vec<String> = ["greet", "kotlin/String", "kotlin/Unit", "kotlin/Int"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let types = StringTableTypes::default();
        let resolver = NameResolver::new(&types, &strings);

        let parameter = RawMessage::new().with_message(fields::PARAMETER_TYPE, &class_type(1));
        let function = RawMessage::new()
            .with_int32(fields::FUNCTION_NAME, 0)
            .with_message(fields::FUNCTION_RETURN_TYPE, &class_type(2))
            .with_message(fields::FUNCTION_VALUE_PARAMETER, &parameter)
            .with_message(fields::FUNCTION_RECEIVER_TYPE, &class_type(3));

        let method = function_signature(&function, &resolver, None)
            .unwrap()
            .unwrap();
        assert_eq!(method.name(), "greet");
        assert_eq!(method.descriptor(), "(ILjava/lang/String;)V");
    }

    #[test]
    fn test_function_signature_explicit() {
        let strings: Vec<String> = ["f", "f$impl", "(J)J"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let types = StringTableTypes::default();
        let resolver = NameResolver::new(&types, &strings);
        let signature = RawMessage::new()
            .with_int32(fields::SIGNATURE_NAME, 1)
            .with_int32(fields::SIGNATURE_DESC, 2);
        let function = RawMessage::new()
            .with_int32(fields::FUNCTION_NAME, 0)
            .with_message(fields::JVM_SIGNATURE, &signature);

        let method = function_signature(&function, &resolver, None)
            .unwrap()
            .unwrap();
        assert_eq!(method.name(), "f$impl");
        assert_eq!(method.descriptor(), "(J)J");
    }

    #[test]
    fn test_type_parameter_has_no_signature() {
        let strings = vec!["generic".to_string()];
        let types = StringTableTypes::default();
        let resolver = NameResolver::new(&types, &strings);
        let type_parameter = RawMessage::new().with_int32(7, 0);
        let function = RawMessage::new()
            .with_int32(fields::FUNCTION_NAME, 0)
            .with_message(fields::FUNCTION_RETURN_TYPE, &type_parameter);
        assert!(function_signature(&function, &resolver, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_constructor_signature_with_type_table() {
        let strings = vec!["kotlin/Long".to_string()];
        let types = StringTableTypes::default();
        let resolver = NameResolver::new(&types, &strings);
        let table = TypeTable {
            types: vec![class_type(0)],
        };
        let parameter = RawMessage::new().with_int32(fields::PARAMETER_TYPE_ID, 0);
        let constructor =
            RawMessage::new().with_message(fields::CONSTRUCTOR_VALUE_PARAMETER, &parameter);

        let method = constructor_signature(&constructor, &resolver, Some(&table))
            .unwrap()
            .unwrap();
        assert_eq!(method.name(), "<init>");
        assert_eq!(method.descriptor(), "(J)V");
    }

    #[test]
    fn test_property_members() {
        let strings: Vec<String> = [
            "size",
            "getSize",
            "()I",
            "setSize",
            "(I)V",
            "getSize$annotations",
            "()V",
            "kotlin/Int",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let types = StringTableTypes::default();
        let resolver = NameResolver::new(&types, &strings);
        let method = |name, desc| {
            RawMessage::new()
                .with_int32(fields::SIGNATURE_NAME, name)
                .with_int32(fields::SIGNATURE_DESC, desc)
        };
        let signature = RawMessage::new()
            .with_message(fields::PROPERTY_SIGNATURE_FIELD, &RawMessage::new())
            .with_message(fields::PROPERTY_SIGNATURE_GETTER, &method(1, 2))
            .with_message(fields::PROPERTY_SIGNATURE_SETTER, &method(3, 4))
            .with_message(fields::PROPERTY_SIGNATURE_SYNTHETIC, &method(5, 6));
        let property = RawMessage::new()
            .with_int32(fields::PROPERTY_NAME, 0)
            .with_message(fields::PROPERTY_RETURN_TYPE, &class_type(7))
            .with_message(fields::JVM_SIGNATURE, &signature);

        let members = property_members(&property, &resolver, None).unwrap();
        assert_eq!(members.name, "size");
        assert_eq!(members.getter, Some(MethodElement::new("getSize", "()I")));
        assert_eq!(members.setter, Some(MethodElement::new("setSize", "(I)V")));
        assert_eq!(
            members.holder,
            Some(MethodElement::new("getSize$annotations", "()V"))
        );
        let field = members.field.unwrap();
        assert_eq!(field.name(), "size");
        assert_eq!(field.descriptor(), "I");
        assert_eq!(field.extension(), FIELD_EXTENSION);
    }
}
