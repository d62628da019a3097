//! TypeScript analyzer using tree-sitter
//!
//! Definitions are `gql.<builder>(<arrow function>)` calls. Their structural
//! path is the top-level binding they are assigned to, extended with the
//! nearest property key for nested calls, and suffixed `$N` on duplicates.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tree_sitter::Node;
use weft_core::{
    DefinitionRecord, Diagnostic, ElementType, ImportKind, ModuleExport, ModuleImport,
};

use crate::analyzer::{AnalyzerHelper, ModuleAnalysis, ModuleAnalyzer, ModuleInput};
use crate::parser_pool::{create_parser_pool, Dialect, ParserPool};

pub const TYPESCRIPT_ANALYZER_VERSION: &str = concat!("ts-tree-sitter/", env!("CARGO_PKG_VERSION"));

/// Diagnostic codes reported by this analyzer.
pub mod codes {
    pub const SYNTAX_ERROR: &str = "syntax-error";
    pub const NON_TOP_LEVEL_DEFINITION: &str = "non-top-level-definition";
    pub const NAMESPACE_REEXPORT: &str = "unsupported-namespace-reexport";
}

/// Expression wrappers that keep a call bound to the same site.
const TRANSPARENT_WRAPPERS: &[&str] = &[
    "parenthesized_expression",
    "as_expression",
    "satisfies_expression",
    "non_null_expression",
];

pub struct TypeScriptAnalyzer {
    parser_pool: ParserPool,
}

impl TypeScriptAnalyzer {
    pub fn new() -> Self {
        Self::with_pool(create_parser_pool())
    }

    pub fn with_pool(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }

    /// Extensions this analyzer understands.
    pub fn handles(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| weft_core::resolve::RESOLVE_EXTENSIONS.contains(&e))
    }
}

impl Default for TypeScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleAnalyzer for TypeScriptAnalyzer {
    fn version(&self) -> &str {
        TYPESCRIPT_ANALYZER_VERSION
    }

    fn analyze(&self, input: &ModuleInput, helper: &AnalyzerHelper) -> Option<ModuleAnalysis> {
        let dialect = Dialect::from_path(&input.file_path);
        let tree = match self.parser_pool.parse_blocking(dialect, input.source.clone()) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", input.file_path.display(), e);
                return None;
            }
        };

        let root = tree.root_node();
        let mut scan = ModuleScan::new(&input.source);
        scan.visit(root);
        let locals = top_level_bindings(root, &input.source);
        let analysis = scan.finish(root, &locals, input, helper);

        tracing::debug!(
            "Analyzed {}: {} definitions, {} imports, {} exports",
            input.file_path.display(),
            analysis.definitions.len(),
            analysis.imports.len(),
            analysis.exports.len()
        );
        Some(analysis)
    }
}

/// One pass over the syntax tree collecting module edges and the `gql`
/// calls that become definitions.
struct ModuleScan<'a, 't> {
    source: &'a str,
    imports: Vec<ModuleImport>,
    exports: Vec<ModuleExport>,
    diagnostics: Vec<Diagnostic>,
    calls: Vec<Node<'t>>,
}

impl<'a, 't> ModuleScan<'a, 't> {
    fn new(source: &'a str) -> Self {
        ModuleScan {
            source,
            imports: Vec::new(),
            exports: Vec::new(),
            diagnostics: Vec::new(),
            calls: Vec::new(),
        }
    }

    fn visit(&mut self, node: Node<'t>) {
        match node.kind() {
            "import_statement" => {
                self.import_statement(node);
                return;
            }
            "export_statement" => self.export_statement(node),
            "call_expression" => self.call_expression(node),
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
    }

    fn import_statement(&mut self, node: Node<'t>) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let specifier = string_value(source, self.source);
        let type_only = has_token(node, "type");

        let Some(clause) = named_child_of_kind(node, "import_clause") else {
            self.imports.push(side_effect_import(specifier));
            return;
        };

        let mut cursor = clause.walk();
        for part in clause.named_children(&mut cursor) {
            match part.kind() {
                "identifier" => self.imports.push(ModuleImport {
                    source: specifier.to_string(),
                    imported: "default".to_string(),
                    local: text(part, self.source).to_string(),
                    kind: ImportKind::Default,
                    is_type_only: type_only,
                }),
                "namespace_import" => {
                    if let Some(local) = named_child_of_kind(part, "identifier") {
                        self.imports.push(ModuleImport {
                            source: specifier.to_string(),
                            imported: "*".to_string(),
                            local: text(local, self.source).to_string(),
                            kind: ImportKind::Namespace,
                            is_type_only: type_only,
                        });
                    }
                }
                "named_imports" => {
                    let mut specifiers = part.walk();
                    for item in part.named_children(&mut specifiers) {
                        if item.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = item.child_by_field_name("name") else {
                            continue;
                        };
                        let imported = name_value(name, self.source);
                        let local = item
                            .child_by_field_name("alias")
                            .map_or(imported, |alias| text(alias, self.source));
                        self.imports.push(ModuleImport {
                            source: specifier.to_string(),
                            imported: imported.to_string(),
                            local: local.to_string(),
                            kind: ImportKind::Named,
                            is_type_only: type_only || has_token(item, "type"),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn export_statement(&mut self, node: Node<'t>) {
        if has_token(node, "type") {
            return;
        }
        let source = node
            .child_by_field_name("source")
            .map(|s| string_value(s, self.source));

        if let Some(clause) = named_child_of_kind(node, "export_clause") {
            let mut cursor = clause.walk();
            for item in clause.named_children(&mut cursor) {
                if item.kind() != "export_specifier" || has_token(item, "type") {
                    continue;
                }
                let Some(name) = item.child_by_field_name("name") else {
                    continue;
                };
                let local = name_value(name, self.source);
                let exported = item
                    .child_by_field_name("alias")
                    .map_or(local, |alias| name_value(alias, self.source));
                self.exports.push(match source {
                    Some(source) => ModuleExport::Reexport {
                        exported: exported.to_string(),
                        source: source.to_string(),
                        imported: local.to_string(),
                    },
                    None => ModuleExport::Named {
                        exported: exported.to_string(),
                        local: local.to_string(),
                    },
                });
            }
            return;
        }

        if let Some(namespace) = named_child_of_kind(node, "namespace_export") {
            if let Some(source) = source {
                let alias = namespace
                    .named_child(0)
                    .map_or("", |n| name_value(n, self.source));
                self.diagnostics.push(Diagnostic::warning(
                    codes::NAMESPACE_REEXPORT,
                    format!("`export * as {alias}` from \"{source}\" is tracked as a module edge only"),
                ));
                self.imports.push(side_effect_import(source));
            }
            return;
        }

        if has_token(node, "*") {
            if let Some(source) = source {
                self.exports.push(ModuleExport::ReexportAll {
                    source: source.to_string(),
                });
            }
            return;
        }

        let is_default = has_token(node, "default");
        if let Some(declaration) = node.child_by_field_name("declaration") {
            for name in declared_names(declaration, self.source) {
                self.exports.push(ModuleExport::Named {
                    exported: if is_default { "default" } else { name }.to_string(),
                    local: name.to_string(),
                });
            }
        } else if is_default {
            if let Some(value) = node.child_by_field_name("value") {
                if value.kind() == "identifier" {
                    self.exports.push(ModuleExport::Named {
                        exported: "default".to_string(),
                        local: text(value, self.source).to_string(),
                    });
                }
            }
        }
    }

    fn call_expression(&mut self, node: Node<'t>) {
        let Some(callee) = node.child_by_field_name("function") else {
            return;
        };
        if callee.kind() == "import" {
            let specifier = node
                .child_by_field_name("arguments")
                .and_then(first_argument)
                .filter(|arg| arg.kind() == "string");
            if let Some(specifier) = specifier {
                self.imports
                    .push(side_effect_import(string_value(specifier, self.source)));
            }
        } else if gql_builder(node, self.source).is_some() {
            self.calls.push(node);
        }
    }

    fn finish(
        mut self,
        root: Node<'t>,
        locals: &[&str],
        input: &ModuleInput,
        helper: &AnalyzerHelper,
    ) -> ModuleAnalysis {
        if root.has_error() {
            let line = first_error(root).map_or(0, |n| n.start_position().row + 1);
            self.diagnostics.push(Diagnostic::error(
                codes::SYNTAX_ERROR,
                format!("source does not parse cleanly (first error on line {line})"),
            ));
        }

        let mut known: BTreeSet<&str> = locals.iter().copied().collect();
        let mut namespaces: BTreeSet<&str> = BTreeSet::new();
        for import in &self.imports {
            match import.kind {
                ImportKind::SideEffect => {}
                ImportKind::Namespace => {
                    namespaces.insert(import.local.as_str());
                    known.insert(import.local.as_str());
                }
                _ => {
                    known.insert(import.local.as_str());
                }
            }
        }

        let exported_as: HashMap<&str, &str> = self
            .exports
            .iter()
            .filter_map(|e| match e {
                ModuleExport::Named { exported, local } => Some((local.as_str(), exported.as_str())),
                _ => None,
            })
            .collect();

        let mut occurrences: HashMap<String, usize> = HashMap::new();
        let mut definitions = Vec::new();
        let mut diagnostics = Vec::new();

        for &call in &self.calls {
            if call.has_error() {
                continue;
            }
            let Some(arguments) = call.child_by_field_name("arguments") else {
                continue;
            };
            let Some(arrow) = first_argument(arguments).filter(|a| a.kind() == "arrow_function")
            else {
                continue;
            };

            let site = binding_site(call);
            let (base, local_name, is_top_level) = match site.parent() {
                Some(parent) if is_top_level_binding(parent, site) => {
                    let name = declarator_name(parent, self.source).to_string();
                    (name.clone(), Some(name), true)
                }
                Some(parent)
                    if parent.kind() == "export_statement"
                        && parent.parent().is_some_and(|p| p.kind() == "program") =>
                {
                    ("default".to_string(), None, true)
                }
                parent => {
                    let enclosing = enclosing_declarator(call)
                        .map(|d| declarator_name(d, self.source));
                    let key = parent.and_then(|p| property_key(p, site, self.source));
                    let base = match (enclosing, key) {
                        (Some(d), Some(k)) => format!("{d}.{k}"),
                        (Some(d), None) => d.to_string(),
                        (None, Some(k)) => k.to_string(),
                        (None, None) => "anonymous".to_string(),
                    };
                    (base, None, false)
                }
            };

            let count = occurrences.entry(base.clone()).or_insert(0);
            let ast_path = if *count == 0 {
                base
            } else {
                format!("{base}${count}")
            };
            *count += 1;

            if !is_top_level {
                diagnostics.push(Diagnostic::warning(
                    codes::NON_TOP_LEVEL_DEFINITION,
                    format!("definition `{ast_path}` is not bound at the top level"),
                ));
            }

            let export_binding = if is_top_level && local_name.is_none() {
                Some("default".to_string())
            } else {
                local_name
                    .as_deref()
                    .and_then(|l| exported_as.get(l))
                    .map(|e| e.to_string())
            };

            let element_type =
                builder_call(arrow, self.source).and_then(|(head, method)| classify_builder(head, method));

            let references =
                collect_references(arguments, self.source, &known, &namespaces, local_name.as_deref());

            definitions.push(DefinitionRecord {
                canonical_id: helper.canonical_id(&input.file_path, &ast_path),
                ast_path,
                is_top_level,
                is_exported: export_binding.is_some(),
                export_binding,
                local_name,
                element_type,
                references,
            });
        }

        self.diagnostics.extend(diagnostics);
        ModuleAnalysis {
            definitions,
            imports: self.imports,
            exports: self.exports,
            diagnostics: self.diagnostics,
        }
    }
}

fn text<'a>(node: Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Contents of a string literal without its quotes.
fn string_value<'a>(node: Node, source: &'a str) -> &'a str {
    text(node, source).trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// An identifier, or a string used as a module export name.
fn name_value<'a>(node: Node, source: &'a str) -> &'a str {
    if node.kind() == "string" {
        string_value(node, source)
    } else {
        text(node, source)
    }
}

/// Whether `node` has an anonymous child token of `kind`.
fn has_token(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == kind);
    found
}

fn named_child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|child| child.kind() == kind);
    found
}

fn first_argument(arguments: Node) -> Option<Node> {
    let mut cursor = arguments.walk();
    let found = arguments
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment");
    found
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

/// `gql.<builder>(...)` -> `builder`.
fn gql_builder<'a>(call: Node, source: &'a str) -> Option<&'a str> {
    let callee = call.child_by_field_name("function")?;
    if callee.kind() != "member_expression" {
        return None;
    }
    let object = callee.child_by_field_name("object")?;
    if object.kind() != "identifier" || text(object, source) != "gql" {
        return None;
    }
    Some(text(callee.child_by_field_name("property")?, source))
}

/// The outermost node that still stands for `call` at its binding site.
fn binding_site(call: Node) -> Node {
    let mut site = call;
    while let Some(parent) = site.parent() {
        if !TRANSPARENT_WRAPPERS.contains(&parent.kind()) {
            break;
        }
        site = parent;
    }
    site
}

fn declarator_name<'a>(declarator: Node, source: &'a str) -> &'a str {
    declarator
        .child_by_field_name("name")
        .map_or("", |n| text(n, source))
}

/// A `variable_declarator` of a declaration that sits directly in the
/// program, exported or not.
fn is_top_level_declarator(declarator: Node) -> bool {
    if declarator.kind() != "variable_declarator" {
        return false;
    }
    if declarator
        .child_by_field_name("name")
        .is_none_or(|n| n.kind() != "identifier")
    {
        return false;
    }
    let Some(declaration) = declarator.parent() else {
        return false;
    };
    match declaration.parent() {
        Some(p) if p.kind() == "program" => true,
        Some(p) if p.kind() == "export_statement" => {
            p.parent().is_some_and(|pp| pp.kind() == "program")
        }
        _ => false,
    }
}

/// `parent` binds `site` directly as the value of a top-level declarator.
fn is_top_level_binding(parent: Node, site: Node) -> bool {
    is_top_level_declarator(parent) && parent.child_by_field_name("value") == Some(site)
}

fn enclosing_declarator(node: Node) -> Option<Node> {
    let mut current = node.parent();
    while let Some(n) = current {
        if is_top_level_declarator(n) {
            return Some(n);
        }
        current = n.parent();
    }
    None
}

/// Name the nearest binding gives `site`: an object key, a local variable,
/// a class field or an assignment target.
fn property_key<'a>(parent: Node, site: Node, source: &'a str) -> Option<&'a str> {
    match parent.kind() {
        "pair" if parent.child_by_field_name("value") == Some(site) => {
            parent.child_by_field_name("key").map(|k| name_value(k, source))
        }
        "variable_declarator" | "public_field_definition" => parent
            .child_by_field_name("name")
            .filter(|n| n.kind() == "identifier" || n.kind() == "property_identifier")
            .map(|n| text(n, source)),
        "assignment_expression" => {
            let left = parent.child_by_field_name("left")?;
            match left.kind() {
                "identifier" => Some(text(left, source)),
                "member_expression" => left.child_by_field_name("property").map(|p| text(p, source)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Names bound by a declaration statement.
fn declared_names<'a>(declaration: Node, source: &'a str) -> Vec<&'a str> {
    match declaration.kind() {
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = declaration.walk();
            let names = declaration
                .named_children(&mut cursor)
                .filter(|d| d.kind() == "variable_declarator")
                .filter_map(|d| d.child_by_field_name("name"))
                .filter(|n| n.kind() == "identifier")
                .map(|n| text(n, source))
                .collect();
            names
        }
        "function_declaration"
        | "generator_function_declaration"
        | "class_declaration"
        | "abstract_class_declaration"
        | "enum_declaration" => declaration
            .child_by_field_name("name")
            .map(|n| vec![text(n, source)])
            .unwrap_or_default(),
        "ambient_declaration" => declaration
            .named_child(0)
            .map(|inner| declared_names(inner, source))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Variables declared at the top of the module.
fn top_level_bindings<'a>(root: Node, source: &'a str) -> Vec<&'a str> {
    let mut cursor = root.walk();
    let mut names = Vec::new();
    for statement in root.named_children(&mut cursor) {
        let declaration = match statement.kind() {
            "export_statement" => statement.child_by_field_name("declaration"),
            _ => Some(statement),
        };
        if let Some(d) = declaration.filter(|d| {
            d.kind() == "lexical_declaration" || d.kind() == "variable_declaration"
        }) {
            names.extend(declared_names(d, source));
        }
    }
    names
}

/// `head.method(...)` returned by the builder callback.
fn builder_call<'a>(arrow: Node, source: &'a str) -> Option<(&'a str, &'a str)> {
    let mut body = arrow.child_by_field_name("body")?;
    loop {
        match body.kind() {
            "parenthesized_expression" => body = body.named_child(0)?,
            "statement_block" => {
                let ret = named_child_of_kind(body, "return_statement")?;
                body = ret.named_child(0)?;
            }
            _ => break,
        }
    }
    if body.kind() != "call_expression" {
        return None;
    }
    let callee = body.child_by_field_name("function")?;
    if callee.kind() != "member_expression" {
        return None;
    }
    let head = callee.child_by_field_name("object")?;
    if head.kind() != "identifier" {
        return None;
    }
    let method = callee.child_by_field_name("property")?;
    Some((text(head, source), text(method, source)))
}

/// Module-level names mentioned under `node`. A member of a namespace import
/// is recorded as `ns.member`.
fn collect_references(
    node: Node,
    source: &str,
    known: &BTreeSet<&str>,
    namespaces: &BTreeSet<&str>,
    own: Option<&str>,
) -> Vec<String> {
    fn walk(
        node: Node,
        source: &str,
        known: &BTreeSet<&str>,
        namespaces: &BTreeSet<&str>,
        own: Option<&str>,
        found: &mut BTreeSet<String>,
    ) {
        match node.kind() {
            "identifier" | "shorthand_property_identifier" => {
                let name = text(node, source);
                if known.contains(name) && Some(name) != own {
                    let member = node
                        .parent()
                        .filter(|p| p.kind() == "member_expression")
                        .filter(|p| p.child_by_field_name("object") == Some(node))
                        .and_then(|p| p.child_by_field_name("property"));
                    match member {
                        Some(member) if namespaces.contains(name) => {
                            found.insert(format!("{name}.{}", text(member, source)));
                        }
                        _ => {
                            found.insert(name.to_string());
                        }
                    }
                }
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    walk(child, source, known, namespaces, own, found);
                }
            }
        }
    }

    let mut found = BTreeSet::new();
    walk(node, source, known, namespaces, own, &mut found);
    found.into_iter().collect()
}

fn side_effect_import(source: &str) -> ModuleImport {
    ModuleImport {
        source: source.to_string(),
        imported: String::new(),
        local: String::new(),
        kind: ImportKind::SideEffect,
        is_type_only: false,
    }
}

fn classify_builder(head: &str, method: &str) -> Option<ElementType> {
    match (head, method) {
        ("model", _) => Some(ElementType::Model),
        (_, "slice") => Some(ElementType::Slice),
        (_, m) if m.starts_with("inline") => Some(ElementType::InlineOperation),
        ("query" | "mutation" | "subscription", _) => Some(ElementType::Operation),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn analyze_at(path: &str, source: &str) -> ModuleAnalysis {
        let analyzer = TypeScriptAnalyzer::with_pool(ParserPool::new(1));
        let input = ModuleInput {
            file_path: PathBuf::from(path),
            source: source.to_string(),
        };
        analyzer.analyze(&input, &AnalyzerHelper::new()).unwrap()
    }

    fn analyze(source: &str) -> ModuleAnalysis {
        analyze_at("/src/a.ts", source)
    }

    #[test]
    fn imports_of_every_kind() {
        let analysis = analyze(
            r#"
import React, { useState as useS, type FC } from "react";
import * as models from "./models";
import type { User } from './types';
import "./polyfill";
const lazy = () => import("./lazy");
"#,
        );
        let summary: Vec<(String, String, ImportKind, bool)> = analysis
            .imports
            .iter()
            .map(|i| (i.source.clone(), i.local.clone(), i.kind, i.is_type_only))
            .collect();

        assert!(summary.contains(&("react".into(), "React".into(), ImportKind::Default, false)));
        assert!(summary.contains(&("react".into(), "useS".into(), ImportKind::Named, false)));
        assert!(summary.contains(&("react".into(), "FC".into(), ImportKind::Named, true)));
        assert!(summary.contains(&("./models".into(), "models".into(), ImportKind::Namespace, false)));
        assert!(summary.contains(&("./types".into(), "User".into(), ImportKind::Named, true)));
        assert!(summary.contains(&("./polyfill".into(), "".into(), ImportKind::SideEffect, false)));
        assert!(summary.contains(&("./lazy".into(), "".into(), ImportKind::SideEffect, false)));
        assert_eq!(summary.len(), 7);
    }

    #[test]
    fn imports_in_comments_and_strings_are_ignored() {
        let analysis = analyze(
            r#"
// import { a } from "./commented";
/* import "./block"; */
const s = "import { b } from './quoted'";
"#,
        );
        assert!(analysis.imports.is_empty());
    }

    #[test]
    fn exports_of_every_kind() {
        let analysis = analyze(
            r#"
export const a = 1;
export function f() {}
const b = 2;
export { b as bee };
export { c as see, d } from "./cd";
export * from "./all";
export type { T } from "./types";
export default b;
"#,
        );
        assert!(analysis.exports.contains(&ModuleExport::Named {
            exported: "a".into(),
            local: "a".into()
        }));
        assert!(analysis.exports.contains(&ModuleExport::Named {
            exported: "f".into(),
            local: "f".into()
        }));
        assert!(analysis.exports.contains(&ModuleExport::Named {
            exported: "bee".into(),
            local: "b".into()
        }));
        assert!(analysis.exports.contains(&ModuleExport::Reexport {
            exported: "see".into(),
            source: "./cd".into(),
            imported: "c".into()
        }));
        assert!(analysis.exports.contains(&ModuleExport::ReexportAll {
            source: "./all".into()
        }));
        assert!(analysis.exports.contains(&ModuleExport::Named {
            exported: "default".into(),
            local: "b".into()
        }));
        assert!(!analysis.exports.iter().any(|e| matches!(
            e,
            ModuleExport::Reexport { source, .. } if source == "./types"
        )));
    }

    #[test]
    fn top_level_definitions_with_references() {
        let analysis = analyze(
            r#"
import { gql } from "@/graphql-system";
import { userModel } from "./models/user";
import * as shared from "./shared";

export const userSlice = gql.default(({ query }) =>
  query.slice({}, ({ f }) => ({ ...userModel.fragment(), ...shared.postModel.fragment() })),
);

export const getUser = gql.default(({ query }) =>
  query.composed({ operationName: "GetUser" }, () => ({ user: userSlice.build() })),
);
"#,
        );

        assert_eq!(analysis.definitions.len(), 2);
        assert!(analysis.diagnostics.is_empty());
        let slice = &analysis.definitions[0];
        assert_eq!(slice.ast_path, "userSlice");
        assert!(slice.is_top_level);
        assert!(slice.is_exported);
        assert_eq!(slice.export_binding.as_deref(), Some("userSlice"));
        assert_eq!(slice.element_type, Some(ElementType::Slice));
        assert_eq!(slice.references, vec!["shared.postModel".to_string(), "userModel".to_string()]);

        let op = &analysis.definitions[1];
        assert_eq!(op.element_type, Some(ElementType::Operation));
        assert_eq!(op.references, vec!["userSlice".to_string()]);
        insta::assert_snapshot!(op.canonical_id.as_str(), @"/src/a.ts::getUser");
    }

    #[test]
    fn nested_and_duplicate_definitions() {
        let analysis = analyze(
            r#"
const models = {
  user: gql.default(({ model }) => model.User({}, () => ({}))),
  post: gql.default(({ model }) => model.Post({}, () => ({}))),
};
gql.default(({ model }) => model.A({}, () => ({})));
gql.default(({ model }) => model.B({}, () => ({})));
"#,
        );
        let paths: Vec<&str> = analysis.definitions.iter().map(|d| d.ast_path.as_str()).collect();
        assert_eq!(paths, vec!["models.user", "models.post", "anonymous", "anonymous$1"]);
        assert!(analysis.definitions.iter().all(|d| !d.is_top_level));
        assert_eq!(
            analysis
                .diagnostics
                .iter()
                .filter(|d| d.code == codes::NON_TOP_LEVEL_DEFINITION)
                .count(),
            4
        );
    }

    #[test]
    fn block_bodied_builder_is_classified() {
        let analysis = analyze(
            "export const m = gql.default(({ model }) => { return model.User({}, () => ({})); });\n",
        );
        assert_eq!(analysis.definitions[0].element_type, Some(ElementType::Model));
    }

    #[test]
    fn default_export_definition() {
        let analysis = analyze("export default gql.default(({ model }) => model.User({}, () => ({})));\n");
        let def = &analysis.definitions[0];
        assert_eq!(def.ast_path, "default");
        assert!(def.is_top_level);
        assert_eq!(def.export_binding.as_deref(), Some("default"));
    }

    #[test]
    fn non_arrow_calls_are_not_definitions() {
        let analysis = analyze("export const x = gql.default(config);\n");
        assert!(analysis.definitions.is_empty());
    }

    #[test]
    fn unterminated_call_is_an_error_diagnostic() {
        let analysis = analyze("export const x = gql.default(({ model }) => model.User(\n");
        assert!(analysis.definitions.is_empty());
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.code == codes::SYNTAX_ERROR));
    }

    #[test]
    fn namespace_reexport_keeps_module_edge() {
        let analysis = analyze("export * as ns from \"./ns\";\n");
        assert!(analysis.exports.is_empty());
        assert_eq!(analysis.imports[0].kind, ImportKind::SideEffect);
        assert_eq!(analysis.imports[0].source, "./ns");
        assert_eq!(analysis.diagnostics[0].code, codes::NAMESPACE_REEXPORT);
    }

    #[test]
    fn tsx_modules_parse_with_jsx() {
        let analysis = analyze_at(
            "/src/view.tsx",
            r#"
import { userModel } from "./user";
export const viewQuery = gql.default(({ query }) => query.operation({}, () => ({ ...userModel.fragment() })));
export const View = () => <div className="user">{viewQuery.name}</div>;
"#,
        );
        assert!(analysis.diagnostics.is_empty());
        assert_eq!(analysis.definitions.len(), 1);
        assert_eq!(analysis.definitions[0].references, vec!["userModel".to_string()]);
    }

    #[test]
    fn namespace_label_scopes_ids() {
        let analyzer = TypeScriptAnalyzer::with_pool(ParserPool::new(1));
        let input = ModuleInput {
            file_path: PathBuf::from("/src/a.ts"),
            source: "export const q = gql.admin(({ query }) => query.composed({}, () => ({})));"
                .to_string(),
        };
        let analysis = analyzer
            .analyze(&input, &AnalyzerHelper::with_namespace("admin"))
            .unwrap();
        assert_eq!(analysis.definitions[0].canonical_id.as_str(), "admin:/src/a.ts::q");
    }
}
