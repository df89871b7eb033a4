use crate::models::{Definition, ValueType};
use crate::paths;
use crate::services::reader::ModFile;

/// Input handed to a [`DefinitionParser`] for one file.
#[derive(Debug, Clone)]
pub struct ParseArgs<'a> {
    pub mod_name: &'a str,
    /// Dependencies declared by the owning mod.
    pub mod_dependencies: &'a [String],
    pub file: &'a ModFile,
}

impl<'a> ParseArgs<'a> {
    pub fn new(mod_name: &'a str, mod_dependencies: &'a [String], file: &'a ModFile) -> Self {
        Self {
            mod_name,
            mod_dependencies,
            file,
        }
    }
}

/// Turns one mod file into definitions.
///
/// Parsers never fail: malformed input produces a definition with its error
/// fields set, or an `Invalid` definition.
pub trait DefinitionParser: Send + Sync {
    fn name(&self) -> &str;

    fn parse(&self, args: &ParseArgs<'_>) -> Vec<Definition>;
}

/// Treats every file as one atomic definition.
///
/// Text files become `WholeTextFile` definitions carrying the full text;
/// other files become `Binary` definitions whose identity is the content
/// hash. The type is the file's directory and the id is its file name.
#[derive(Debug, Clone, Default)]
pub struct WholeFileParser;

impl WholeFileParser {
    pub fn new() -> Self {
        Self
    }
}

impl DefinitionParser for WholeFileParser {
    fn name(&self) -> &str {
        "WholeFileParser"
    }

    fn parse(&self, args: &ParseArgs<'_>) -> Vec<Definition> {
        let file = args.file;
        let type_name = paths::parent_directory(&file.path);
        let id = paths::file_name(&file.path);

        let mut definition = Definition::new(type_name, id, args.mod_name, file.path.clone())
            .with_dependencies(args.mod_dependencies.iter().cloned())
            .with_content_sha(file.content_sha.clone());
        definition.used_parser = Some(self.name().to_string());

        if file.is_binary {
            definition.value_type = ValueType::Binary;
            definition.definition_sha = file.content_sha.clone();
        } else {
            definition.value_type = ValueType::WholeTextFile;
            definition.set_code(file.text().into_owned());
        }

        vec![definition]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_file_becomes_whole_text_definition() {
        let file = ModFile::new("common/defines/00_defines.txt", b"NGame = { START = 1 }".to_vec());
        let deps = vec!["Base".to_string()];
        let defs = WholeFileParser::new().parse(&ParseArgs::new("ModA", &deps, &file));

        assert_eq!(defs.len(), 1);
        let def = &defs[0];
        assert_eq!(def.type_name, "common/defines");
        assert_eq!(def.id, "00_defines.txt");
        assert_eq!(def.value_type, ValueType::WholeTextFile);
        assert_eq!(def.code, "NGame = { START = 1 }");
        assert_eq!(def.dependencies, deps);
        assert_eq!(def.content_sha, file.content_sha);
        assert_eq!(def.used_parser.as_deref(), Some("WholeFileParser"));
    }

    #[test]
    fn test_binary_file_uses_content_hash() {
        let file = ModFile::new("gfx/icon.dds", vec![1, 2, 3]);
        let defs = WholeFileParser::new().parse(&ParseArgs::new("ModA", &[], &file));

        assert_eq!(defs[0].value_type, ValueType::Binary);
        assert!(defs[0].code.is_empty());
        assert_eq!(defs[0].definition_sha, file.content_sha);
    }
}
