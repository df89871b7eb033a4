//! Variable merging.
//!
//! Scripted variables and namespace declarations only mean something inside
//! the file that declares them. Before a file's definitions are indexed,
//! every object that references a variable gets that variable's declaration
//! folded into its own code so the object can be exported on its own.

use crate::models::{Definition, ValueType};

/// Fold the variables and namespaces of one file into its objects.
///
/// `definitions` must all come from the same file. Variables, namespaces and
/// invalid records are returned unchanged alongside the merged objects.
pub fn merge_definitions(mut definitions: Vec<Definition>) -> Vec<Definition> {
    let namespaces: Vec<(String, String)> = definitions
        .iter()
        .filter(|d| d.value_type == ValueType::Namespace)
        .map(|d| (d.id.clone(), d.code.clone()))
        .collect();
    let variables: Vec<(String, String)> = definitions
        .iter()
        .filter(|d| d.value_type == ValueType::Variable)
        .map(|d| (d.id.clone(), d.code.clone()))
        .collect();

    if namespaces.is_empty() && variables.is_empty() {
        return definitions;
    }

    for definition in definitions.iter_mut().filter(|d| d.is_conflict_candidate()) {
        let used: Vec<&str> = variables
            .iter()
            .filter(|(id, _)| !id.is_empty() && definition.code.contains(id.as_str()))
            .map(|(_, code)| code.as_str())
            .collect();
        let namespace_code: Vec<&str> = namespaces.iter().map(|(_, code)| code.as_str()).collect();

        let merged = if definition.is_first_level {
            let mut merged = String::new();
            append_lines(&mut merged, &namespace_code);
            append_lines(&mut merged, &used);
            append_lines(&mut merged, &[definition.code.as_str()]);
            merged
        } else {
            let with_variables = splice_after_open_brace(&definition.code, &clean_bodies(&used));
            splice_after_open_brace(&with_variables, &clean_bodies(&namespace_code))
        };

        if merged != definition.code {
            definition.set_code(merged);
        }
    }

    definitions
}

fn append_lines(buffer: &mut String, lines: &[&str]) {
    if lines.is_empty() {
        return;
    }
    buffer.push_str(&lines.join("\n"));
    buffer.push('\n');
}

/// Insert `lines` right after the first `{` of `code`.
fn splice_after_open_brace(code: &str, lines: &[String]) -> String {
    if lines.is_empty() {
        return code.to_string();
    }
    let index = code.find('{').map(|i| i + 1).unwrap_or(0);
    let mut result = String::with_capacity(code.len() + lines.iter().map(String::len).sum::<usize>() + 2);
    result.push_str(&code[..index]);
    result.push('\n');
    result.push_str(&lines.join("\n"));
    result.push('\n');
    result.push_str(&code[index..]);
    result.replace("\r\n", "\n")
}

/// Bodies of `blocks` between their outer braces, on one line each.
fn clean_bodies(blocks: &[&str]) -> Vec<String> {
    blocks
        .iter()
        .map(|code| {
            let start = code.find('{').map(|i| i + 1).unwrap_or(0);
            let body = code[start..].replace(['\r', '\n'], "");
            let end = body.rfind('}').unwrap_or(body.len());
            body[..end].trim().to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(id: &str, code: &str) -> Definition {
        Definition::new("common/buildings", id, "ModA", "common/buildings/a.txt")
            .with_code(code)
            .with_value_type(ValueType::Variable)
    }

    fn namespace(id: &str, code: &str) -> Definition {
        Definition::new("events", id, "ModA", "events/a.txt")
            .with_code(code)
            .with_value_type(ValueType::Namespace)
    }

    #[test]
    fn test_first_level_gets_used_variables_prepended() {
        let object = Definition::new("common/buildings", "b1", "ModA", "common/buildings/a.txt")
            .with_code("b1 = { cost = @cost }");
        let before = object.definition_sha.clone();
        let merged = merge_definitions(vec![
            variable("@cost", "@cost = 10"),
            variable("@unused", "@unused = 1"),
            object,
        ]);

        let object = merged.iter().find(|d| d.id == "b1").unwrap();
        assert_eq!(object.code, "@cost = 10\nb1 = { cost = @cost }\n");
        assert_ne!(object.definition_sha, before);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_first_level_namespaces_come_first() {
        let object = Definition::new("events", "ns.1", "ModA", "events/a.txt").with_code("country_event = { id = ns.1 }");
        let merged = merge_definitions(vec![namespace("ns", "namespace = ns"), object]);

        let object = merged.iter().find(|d| d.id == "ns.1").unwrap();
        assert_eq!(object.code, "namespace = ns\ncountry_event = { id = ns.1 }\n");
    }

    #[test]
    fn test_nested_object_gets_spliced_bodies() {
        let mut object = Definition::new("common/buildings", "b1", "ModA", "common/buildings/a.txt")
            .with_code("b1 = {\n\tcost = @cost\n}");
        object.is_first_level = false;
        let merged = merge_definitions(vec![variable("@cost", "inline = {\n @cost = 10\n}"), object]);

        let object = merged.iter().find(|d| d.id == "b1").unwrap();
        assert_eq!(object.code, "b1 = {\n@cost = 10\n\n\tcost = @cost\n}");
    }

    #[test]
    fn test_no_variables_is_untouched() {
        let object = Definition::new("events", "e1", "ModA", "events/a.txt").with_code("e1 = {}");
        let merged = merge_definitions(vec![object.clone()]);
        assert_eq!(merged, vec![object]);
    }
}
