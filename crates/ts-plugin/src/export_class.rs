//! Rewrites exported class declarations into separate exports.
//!
//! Targeting ES5 with ES2015 modules, older compilers emit an exported class
//! as `exports.A = A;` instead of an ES export. Declaring the class plainly
//! and exporting it afterwards avoids that:
//!
//! ```text
//! export class A {}            ->  class A {}
//!                                  export { A };
//! export default class B {}    ->  class B {}
//!                                  export { B as default };
//! ```
//!
//! The removed keywords are overwritten with spaces and the exports appended
//! at the end, so every original position is unchanged.

use camino::Utf8Path;
use std::borrow::Cow;
use std::sync::Arc;
use swc_common::{BytePos, FileName, SourceMap, Span};
use swc_ecma_ast::{
    ClassDecl, ClassExpr, Decl, DefaultDecl, EsVersion, ExportDecl, ExportDefaultDecl, ModuleDecl,
    ModuleItem,
};
use swc_ecma_parser::{parse_file_as_module, Syntax, TsSyntax};
use tracing::debug;

struct Rewrite {
    /// Byte ranges to blank out.
    erase: Vec<(usize, usize)>,
    /// `export { .. };` statements to append.
    exports: Vec<String>,
}

/// Applies the rewrite to `code`. Code that does not parse is returned as is.
pub fn fix_export_class<'a>(code: &'a str, id: &Utf8Path) -> Cow<'a, str> {
    let cm: Arc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Custom(id.to_string()).into(), code.to_string());

    let syntax = Syntax::Typescript(TsSyntax {
        tsx: id.extension() == Some("tsx"),
        decorators: true,
        ..Default::default()
    });

    let module = match parse_file_as_module(&fm, syntax, EsVersion::Es2022, None, &mut Vec::new())
    {
        Ok(module) => module,
        Err(e) => {
            debug!(file = %id, "skipping export rewrite, parse failed: {:?}", e.kind());
            return Cow::Borrowed(code);
        }
    };

    let start_pos = fm.start_pos;
    let offset = |pos: BytePos| (pos - start_pos).0 as usize;
    let mut rewrite = Rewrite {
        erase: Vec::new(),
        exports: Vec::new(),
    };

    for item in &module.body {
        let ModuleItem::ModuleDecl(decl) = item else {
            continue;
        };
        match decl {
            ModuleDecl::ExportDecl(ExportDecl {
                span,
                decl:
                    Decl::Class(ClassDecl {
                        ident,
                        declare: false,
                        ..
                    }),
            }) => {
                let head = head_range(*span, ident.span.lo, &offset);
                if let Some(range) = keyword_range(code, head, false) {
                    rewrite.erase.push(range);
                    rewrite.exports.push(ident.sym.to_string());
                }
            }
            ModuleDecl::ExportDefaultDecl(ExportDefaultDecl {
                span,
                decl:
                    DefaultDecl::Class(ClassExpr {
                        ident: Some(ident), ..
                    }),
            }) => {
                let head = head_range(*span, ident.span.lo, &offset);
                if let Some(range) = keyword_range(code, head, true) {
                    rewrite.erase.push(range);
                    rewrite.exports.push(format!("{} as default", ident.sym));
                }
            }
            _ => {}
        }
    }

    if rewrite.exports.is_empty() {
        return Cow::Borrowed(code);
    }

    let mut fixed = code.to_string();
    for (start, end) in rewrite.erase {
        fixed.replace_range(start..end, &" ".repeat(end - start));
    }
    for name in rewrite.exports {
        fixed.push_str(&format!("\nexport {{ {name} }};"));
    }
    Cow::Owned(fixed)
}

/// The text between the start of an export statement and the class name.
fn head_range(
    span: Span,
    ident_lo: BytePos,
    offset: &impl Fn(BytePos) -> usize,
) -> (usize, usize) {
    (offset(span.lo), offset(ident_lo))
}

/// Finds `export` (and `default` after it) within `head`, returning the byte
/// range to blank.
fn keyword_range(code: &str, (start, end): (usize, usize), default: bool) -> Option<(usize, usize)> {
    let head = code.get(start..end)?;
    let export_at = find_word(head, "export", 0)?;
    let mut erase_end = export_at + "export".len();
    if default {
        let default_at = find_word(head, "default", erase_end)?;
        erase_end = default_at + "default".len();
    }
    Some((start + export_at, start + erase_end))
}

/// Finds `word` at or after `from`, as a whole identifier.
fn find_word(text: &str, word: &str, from: usize) -> Option<usize> {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    let mut search = from;
    while let Some(found) = text.get(search..)?.find(word) {
        let at = search + found;
        let before = text[..at].chars().next_back();
        let after = text[at + word.len()..].chars().next();
        if !before.is_some_and(is_ident) && !after.is_some_and(is_ident) {
            return Some(at);
        }
        search = at + word.len();
    }
    None
}
