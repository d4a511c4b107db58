//! Editor-facing analysis: parse a source text and report diagnostics
//! plus a flat symbol table, serialisable as JSON.

use serde::{Deserialize, Serialize};

use lingo_ast::Root;
use lingo_parser::parse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub severity: DiagnosticSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SymbolKind {
    Handler,
    Property,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompilerDiagnostics {
    pub errors: Vec<Diagnostic>,
    pub symbols: Vec<SymbolInfo>,
}

pub fn analyze_source(source: &str) -> CompilerDiagnostics {
    let mut out = CompilerDiagnostics::default();
    match parse(source) {
        Ok(root) => collect_symbols(&root, &mut out.symbols),
        Err(e) => {
            let (line, column) = e.pos().map(|p| (p.line, p.column)).unwrap_or((0, 0));
            out.errors.push(Diagnostic {
                message: e.message().to_string(),
                line,
                column,
                severity: DiagnosticSeverity::Error,
            });
        }
    }
    out
}

fn collect_symbols(root: &Root, syms: &mut Vec<SymbolInfo>) {
    for p in &root.properties {
        syms.push(SymbolInfo { name: p.clone(), kind: SymbolKind::Property, line: 0, column: 0 });
    }
    for h in &root.handlers {
        syms.push(SymbolInfo {
            name: h.name.clone(),
            kind: SymbolKind::Handler,
            line: h.pos.line,
            column: h.pos.column,
        });
    }
}
