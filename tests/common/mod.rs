//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use jarfilter::{
    archive::entries::read_entries,
    classfile::{attributes::CODE, code::CodeAttribute, ClassFile},
    Result,
};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Marker annotations used throughout the tests.
pub const DELETE: &str = "Ltest/DeleteMe;";
pub const STUB: &str = "Ltest/StubMeOut;";
pub const STRIP: &str = "Ltest/StripMe;";

/// Build an archive from `(name, data)` pairs, deflating everything.
pub fn jar(entries: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options)?;
        } else {
            writer.start_file(*name, options)?;
            writer.write_all(data)?;
        }
    }
    Ok(writer.finish()?.into_inner())
}

/// Names and contents of the entries of an archive.
pub fn unjar(archive: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    Ok(read_entries(archive)?
        .into_iter()
        .map(|entry| (entry.name, entry.data))
        .collect())
}

/// The content of the entry called `name`.
pub fn entry<'a>(entries: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    entries
        .iter()
        .find(|(entry, _)| entry == name)
        .map(|(_, data)| data.as_slice())
}

/// `name + descriptor` of every method of a class.
pub fn method_signatures(class: &[u8]) -> Result<Vec<String>> {
    let class = ClassFile::parse(class)?;
    class
        .methods
        .iter()
        .map(|method| {
            Ok(format!(
                "{}{}",
                class.member_name(method)?,
                class.member_descriptor(method)?
            ))
        })
        .collect()
}

/// Names of every field of a class.
pub fn field_names(class: &[u8]) -> Result<Vec<String>> {
    let class = ClassFile::parse(class)?;
    class
        .fields
        .iter()
        .map(|field| Ok(class.member_name(field)?.to_string()))
        .collect()
}

/// The decoded `Code` attribute of a method.
pub fn method_code(class: &[u8], name: &str) -> Result<Option<CodeAttribute>> {
    let class = ClassFile::parse(class)?;
    for method in &class.methods {
        if class.member_name(method)? != name {
            continue;
        }
        for attribute in &method.attributes {
            if class.constant_pool.utf8(attribute.name_index)? == CODE {
                return Ok(Some(CodeAttribute::parse(&attribute.info)?));
            }
        }
    }
    Ok(None)
}
