pub mod ast;
pub mod attributes;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod resolve;
pub mod scanner;

use wasm_bindgen::prelude::*;

use ast::Document;
use options::ParseOptions;
use parser::Parser;

/// Parse DBML text with default options. Never fails; anything that could
/// not be understood is left out of the document.
pub fn parse(source: &str) -> Document {
    Parser::new(source).parse().document
}

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Parse DBML source to a JSON document
#[wasm_bindgen(js_name = "parseDbml")]
pub fn parse_dbml(source: &str, strict: Option<bool>) -> Result<String, String> {
    let options = ParseOptions {
        strict: strict.unwrap_or(false),
        ..ParseOptions::default()
    };
    let document = Parser::with_options(source, options)
        .parse()
        .into_result()
        .map_err(|e| e.to_string())?;

    serde_json::to_string(&document).map_err(|e| e.to_string())
}
