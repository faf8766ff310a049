// Copyright 2016 James Bendig. See the COPYRIGHT file at the top-level
// directory of this distribution.
//
// Licensed under:
//   the MIT license
//     <LICENSE-MIT or https://opensource.org/licenses/MIT>
//   or the Apache License, Version 2.0
//     <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Loads a `DataDictionary` from the XML dialect described in spec 6, "Data dictionary XML":
//! a root `<fix type="FIX|FIXT" major="X" minor="Y">` with `<fields>`, `<header>`, `<trailer>`,
//! `<messages>`, and `<components>` children. This is the out-of-scope "XML loader" of spec 1 --
//! any DOM reader would do -- so `roxmltree` stands in for it rather than the teacher's
//! compile-time `define_dictionary!`/`define_fields!` macros, which assume a fixed, known-at-
//! compile-time field set instead of a runtime-loaded one.

use std::collections::HashMap;

use roxmltree::{Document,Node};

use crate::constant::ANY_MSG_TYPE;
use crate::errors::ConfigError;
use crate::field_tag::FieldTag;
use crate::field_type::Type;
use crate::fix_version::FIXVersion;

use super::{DataDictionary,GroupDefinition};

/// The static field universe declared under `<fields>`, shared by reference while assembling
/// every nested group dictionary so `<field>`/`<value>` declarations aren't duplicated per group.
struct FieldCatalog {
    version: String,
    fix_version: FIXVersion,
    fields: super::TagSet,
    ordered_fields: Vec<FieldTag>,
    field_type: super::TagMap<Type>,
    field_values: super::TagMap<std::collections::HashSet<String>>,
    names: HashMap<String,FieldTag>,
    field_names: super::TagMap<String>,
    value_names: HashMap<(FieldTag,String),String>,
}

impl FieldCatalog {
    fn tag_for_name(&self,name: &str) -> Result<FieldTag,ConfigError> {
        self.names.get(name).copied().ok_or_else(|| ConfigError::UndeclaredField(name.to_string()))
    }
}

/// The result of parsing one container (`<header>`, `<trailer>`, a `<message>`, or a `<group>`
/// body): the tags it declares, which of those are required, the nested group definitions found
/// directly inside it, and the first tag encountered (used as a group's delimiter tag).
struct ParsedContainer {
    fields: super::TagSet,
    required: super::TagSet,
    groups: Vec<(FieldTag,GroupDefinition)>,
    first_tag: Option<FieldTag>,
    /// Declaration order of every field/group-count tag encountered directly or via an inlined
    /// `<component>`, used to populate `DataDictionary::message_field_order` (spec 4.2, step 4).
    order: Vec<FieldTag>,
}

/// Parses the declared `<field required="Y|N"/>`, `<component name="..."/>`, and `<group .../>`
/// children of `node`, recursing into components and group bodies (spec 4.2, "Group
/// dictionaries": `<component>` inlines fields rather than nesting a dictionary; `<group>` always
/// produces a fresh nested `DataDictionary`).
fn parse_container(node: Node<'_,'_>,catalog: &FieldCatalog,components: &HashMap<String,Node<'_,'_>>) -> Result<ParsedContainer,ConfigError> {
    let mut fields = super::TagSet::default();
    let mut required = super::TagSet::default();
    let mut groups = Vec::new();
    let mut first_tag = None;
    let mut order = Vec::new();

    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "field" => {
                let name = child.attribute("name").ok_or_else(|| ConfigError::MalformedXml("<field> missing name".to_string()))?;
                let tag = catalog.tag_for_name(name)?;
                let is_required = child.attribute("required") == Some("Y");

                fields.insert(tag);
                if is_required {
                    required.insert(tag);
                }
                first_tag.get_or_insert(tag);
                order.push(tag);
            },
            "component" => {
                let name = child.attribute("name").ok_or_else(|| ConfigError::MalformedXml("<component> missing name".to_string()))?;
                let definition = *components.get(name).ok_or_else(|| ConfigError::UndeclaredComponent(name.to_string()))?;
                let nested = parse_container(definition,catalog,components)?;

                if first_tag.is_none() {
                    first_tag = nested.first_tag;
                }
                fields.extend(nested.fields);
                required.extend(nested.required);
                groups.extend(nested.groups);
                order.extend(nested.order);
            },
            "group" => {
                let name = child.attribute("name").ok_or_else(|| ConfigError::MalformedXml("<group> missing name".to_string()))?;
                let count_tag = catalog.tag_for_name(name)?;
                let is_required = child.attribute("required") == Some("Y");

                let body = parse_container(child,catalog,components)?;
                let delimiter_tag = body.first_tag.ok_or_else(|| ConfigError::MalformedXml(format!("group {} has no fields",name)))?;

                let mut nested_dictionary = new_dictionary_from_catalog(catalog);
                nested_dictionary.fields.extend(body.fields.iter().copied());
                for tag in &body.fields {
                    if let Some(field_type) = catalog.field_type.get(tag) {
                        nested_dictionary.field_type.insert(*tag,*field_type);
                    }
                }
                for (count_tag,definition) in &body.groups {
                    nested_dictionary.groups.entry(*count_tag).or_default().insert(ANY_MSG_TYPE.to_string(),definition.clone());
                }

                fields.insert(count_tag);
                if is_required {
                    required.insert(count_tag);
                }
                first_tag.get_or_insert(count_tag);
                order.push(count_tag);

                groups.push((count_tag,GroupDefinition{ delimiter_tag,dictionary: nested_dictionary }));
            },
            _ => {},
        }
    }

    Ok(ParsedContainer{ fields,required,groups,first_tag,order })
}

/// A fresh `DataDictionary` sharing the static field catalog (types, values, names) but with an
/// empty message/group surface -- used both for the top-level dictionary and for every nested
/// group dictionary (spec 3, "Each `groups[g][m].nestedDataDictionary.version = version`").
fn new_dictionary_from_catalog(catalog: &FieldCatalog) -> DataDictionary {
    DataDictionary {
        version: catalog.version.clone(),
        fields: catalog.fields.clone(),
        ordered_fields: catalog.ordered_fields.clone(),
        field_type: catalog.field_type.clone(),
        field_values: catalog.field_values.clone(),
        names: catalog.names.clone(),
        field_names: catalog.field_names.clone(),
        value_names: catalog.value_names.clone(),
        ..Default::default()
    }
}

/// Builds the static `FieldCatalog` from `<fields><field number="N" name="Name" type="TYPE">
/// <value enum="E" description="D"/>...</field>...</fields>`.
fn parse_field_catalog(fields_node: Node<'_,'_>,version: String,fix_version: FIXVersion) -> Result<FieldCatalog,ConfigError> {
    let mut fields = super::TagSet::default();
    let mut ordered_fields = Vec::new();
    let mut field_type = super::TagMap::default();
    let mut field_values = super::TagMap::default();
    let mut names = HashMap::new();
    let mut field_names = super::TagMap::default();
    let mut value_names = HashMap::new();

    for field_node in fields_node.children().filter(|c| c.is_element() && c.tag_name().name() == "field") {
        let number = field_node.attribute("number").ok_or_else(|| ConfigError::MalformedXml("<field> missing number".to_string()))?;
        let name = field_node.attribute("name").ok_or_else(|| ConfigError::MalformedXml("<field> missing name".to_string()))?;
        let xml_type = field_node.attribute("type").unwrap_or("UNKNOWN");

        let tag_number: u32 = number.parse().map_err(|_| ConfigError::MalformedXml(format!("field number {} is not an integer",number)))?;
        let tag = FieldTag(tag_number);

        fields.insert(tag);
        ordered_fields.push(tag);
        field_type.insert(tag,Type::from_xml_type(xml_type,fix_version));
        names.insert(name.to_string(),tag);
        field_names.insert(tag,name.to_string());

        for value_node in field_node.children().filter(|c| c.is_element() && c.tag_name().name() == "value") {
            let Some(enum_value) = value_node.attribute("enum") else { continue; };
            field_values.entry(tag).or_default().insert(enum_value.to_string());
            if let Some(description) = value_node.attribute("description") {
                value_names.insert((tag,enum_value.to_string()),description.to_string());
            }
        }
    }

    Ok(FieldCatalog{ version,fix_version,fields,ordered_fields,field_type,field_values,names,field_names,value_names })
}

fn find_child<'a,'input>(node: Node<'a,'input>,name: &str) -> Option<Node<'a,'input>> {
    node.children().find(|c| c.is_element() && c.tag_name().name() == name)
}

/// Loads a `DataDictionary` from a complete FIX/FIXT dictionary XML document (spec 6, "Data
/// dictionary XML"). Header/trailer groups are registered under the wildcard `ANY_MSG_TYPE`
/// since they apply to every message type rather than one (see `DataDictionary::group_definition`).
pub fn load(xml: &str) -> Result<DataDictionary,ConfigError> {
    let document = Document::parse(xml).map_err(|error| ConfigError::MalformedXml(error.to_string()))?;
    let root = document.root_element();
    if root.tag_name().name() != "fix" {
        return Err(ConfigError::MalformedXml("root element is not <fix>".to_string()));
    }

    let fix_type = root.attribute("type").unwrap_or("FIX");
    let major = root.attribute("major").ok_or_else(|| ConfigError::MalformedXml("<fix> missing major".to_string()))?;
    let minor = root.attribute("minor").ok_or_else(|| ConfigError::MalformedXml("<fix> missing minor".to_string()))?;

    let version = if fix_type == "FIXT" {
        format!("FIXT.{}.{}",major,minor)
    }
    else {
        format!("FIX.{}.{}",major,minor)
    };
    let fix_version = FIXVersion::from_begin_string(&version).unwrap_or(FIXVersion::FIX_4_2);

    let fields_node = find_child(root,"fields").ok_or_else(|| ConfigError::MalformedXml("<fix> missing <fields>".to_string()))?;
    let catalog = parse_field_catalog(fields_node,version.clone(),fix_version)?;

    let mut components = HashMap::new();
    if let Some(components_node) = find_child(root,"components") {
        for component_node in components_node.children().filter(|c| c.is_element() && c.tag_name().name() == "component") {
            if let Some(name) = component_node.attribute("name") {
                components.insert(name.to_string(),component_node);
            }
        }
    }

    let mut dictionary = new_dictionary_from_catalog(&catalog);

    //Trailer/header are only parsed for FIXT or pre-5.x FIX (spec 6), which is this loader's
    //entire supported range, so both are always consulted when present.
    if let Some(header_node) = find_child(root,"header") {
        let parsed = parse_container(header_node,&catalog,&components)?;
        for tag in &parsed.fields {
            dictionary.header_fields.insert(*tag,parsed.required.contains(tag));
        }
        for (count_tag,definition) in parsed.groups {
            dictionary.groups.entry(count_tag).or_default().insert(ANY_MSG_TYPE.to_string(),definition);
        }
    }

    if let Some(trailer_node) = find_child(root,"trailer") {
        let parsed = parse_container(trailer_node,&catalog,&components)?;
        for tag in &parsed.fields {
            dictionary.trailer_fields.insert(*tag,parsed.required.contains(tag));
        }
        for (count_tag,definition) in parsed.groups {
            dictionary.groups.entry(count_tag).or_default().insert(ANY_MSG_TYPE.to_string(),definition);
        }
    }

    if let Some(messages_node) = find_child(root,"messages") {
        for message_node in messages_node.children().filter(|c| c.is_element() && c.tag_name().name() == "message") {
            let msg_type = message_node.attribute("msgtype").ok_or_else(|| ConfigError::MalformedXml("<message> missing msgtype".to_string()))?.to_string();

            let parsed = parse_container(message_node,&catalog,&components)?;
            dictionary.message_fields.insert(msg_type.clone(),parsed.fields);
            dictionary.required_fields.insert(msg_type.clone(),parsed.required);
            dictionary.message_field_order.insert(msg_type.clone(),parsed.order);
            for (count_tag,definition) in parsed.groups {
                dictionary.groups.entry(count_tag).or_default().insert(msg_type.clone(),definition);
            }
        }
    }

    dictionary.data_fields = catalog.fields.iter()
        .copied()
        .filter(|tag| matches!(catalog.field_type.get(tag),Some(Type::Data) | Some(Type::XmlData)))
        .collect();

    Ok(dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_FIX_4_2: &str = r#"
        <fix type="FIX" major="4" minor="2">
            <fields>
                <field number="8" name="BeginString" type="STRING"/>
                <field number="9" name="BodyLength" type="LENGTH"/>
                <field number="35" name="MsgType" type="STRING"/>
                <field number="49" name="SenderCompID" type="STRING"/>
                <field number="56" name="TargetCompID" type="STRING"/>
                <field number="34" name="MsgSeqNum" type="SEQNUM"/>
                <field number="52" name="SendingTime" type="UTCTIMESTAMP"/>
                <field number="10" name="CheckSum" type="STRING"/>
                <field number="11" name="ClOrdID" type="STRING"/>
                <field number="54" name="Side" type="CHAR">
                    <value enum="1" description="BUY"/>
                    <value enum="2" description="SELL"/>
                </field>
                <field number="73" name="NoOrders" type="NUMINGROUP"/>
            </fields>
            <header>
                <field name="BeginString" required="Y"/>
                <field name="BodyLength" required="Y"/>
                <field name="MsgType" required="Y"/>
                <field name="SenderCompID" required="Y"/>
                <field name="TargetCompID" required="Y"/>
                <field name="MsgSeqNum" required="Y"/>
                <field name="SendingTime" required="Y"/>
            </header>
            <trailer>
                <field name="CheckSum" required="Y"/>
            </trailer>
            <messages>
                <message name="NewOrderList" msgtype="E">
                    <group name="NoOrders" required="Y">
                        <field name="ClOrdID" required="Y"/>
                        <field name="Side" required="Y"/>
                    </group>
                </message>
            </messages>
        </fix>
    "#;

    #[test]
    fn loads_version_and_field_catalog() {
        let dictionary = load(SIMPLE_FIX_4_2).unwrap();
        assert_eq!(dictionary.version,"FIX.4.2");
        assert!(dictionary.fields.contains(&FieldTag(54)));
        assert_eq!(dictionary.field_names.get(&FieldTag(54)).map(String::as_str),Some("Side"));
    }

    #[test]
    fn loads_header_and_trailer_required_fields() {
        let dictionary = load(SIMPLE_FIX_4_2).unwrap();
        assert_eq!(dictionary.header_fields.get(&FieldTag(8)),Some(&true));
        assert_eq!(dictionary.trailer_fields.get(&FieldTag(10)),Some(&true));
    }

    #[test]
    fn loads_message_group_with_delimiter_tag() {
        let dictionary = load(SIMPLE_FIX_4_2).unwrap();
        let by_msg_type = dictionary.groups.get(&FieldTag(73)).unwrap();
        let definition = by_msg_type.get("E").unwrap();
        assert_eq!(definition.delimiter_tag,FieldTag(11));
        assert!(definition.dictionary.fields.contains(&FieldTag(54)));
    }

    #[test]
    fn undeclared_field_reference_is_an_error() {
        let xml = r#"
            <fix type="FIX" major="4" minor="2">
                <fields>
                    <field number="8" name="BeginString" type="STRING"/>
                </fields>
                <header>
                    <field name="NotDeclared" required="Y"/>
                </header>
            </fix>
        "#;
        let result = load(xml);
        assert!(matches!(result,Err(ConfigError::UndeclaredField(name)) if name == "NotDeclared"));
    }
}
