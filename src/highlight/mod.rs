//! Syntax highlighting for fenced code blocks.
//!
//! Every language is a rule table for the generic tokenizer. [`Highlighter`]
//! is the caller-owned registry: each table is built the first time its
//! language is requested and shared read-only afterwards.

pub mod css;
pub mod expression;
pub mod html;
mod keywords;
pub mod yaml;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::tokenizer::{escape_html, RuleTable};
use expression::Profile;

pub const CLASS_KEYWORD: &str = "hl-keyword";
pub const CLASS_VARIABLE: &str = "hl-variable";
pub const CLASS_PROPERTY: &str = "hl-property";
pub const CLASS_NUMBER: &str = "hl-number";
pub const CLASS_STRING: &str = "hl-string";
pub const CLASS_COMMENT: &str = "hl-comment";
pub const CLASS_REGEX: &str = "hl-regex";
pub const CLASS_SELECTOR: &str = "hl-selector";
pub const CLASS_VALUE: &str = "hl-value";
pub const CLASS_KEY: &str = "hl-key";
pub const CLASS_BRANCH: &str = "hl-branch";
pub const CLASS_TAG: &str = "hl-tag";
pub const CLASS_ATTR: &str = "hl-attr";

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    Json,
    Java,
    C,
    Cpp,
    CSharp,
    Go,
    Rust,
    Swift,
    Kotlin,
    Php,
    Python,
    Shell,
    VisualBasic,
    Sql,
    Css,
    Yaml,
    Html,
}

impl Language {
    pub const ALL: [Language; 19] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Json,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Go,
        Language::Rust,
        Language::Swift,
        Language::Kotlin,
        Language::Php,
        Language::Python,
        Language::Shell,
        Language::VisualBasic,
        Language::Sql,
        Language::Css,
        Language::Yaml,
        Language::Html,
    ];

    /// Resolve a fence tag such as `js`, `Python` or `c++`.
    pub fn from_name(name: &str) -> Option<Self> {
        let lang = match name.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "jsx" | "mjs" | "node" => Language::JavaScript,
            "typescript" | "ts" | "tsx" => Language::TypeScript,
            "json" => Language::Json,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "c++" | "cc" | "hpp" => Language::Cpp,
            "csharp" | "cs" | "c#" => Language::CSharp,
            "go" | "golang" => Language::Go,
            "rust" | "rs" => Language::Rust,
            "swift" => Language::Swift,
            "kotlin" | "kt" => Language::Kotlin,
            "php" => Language::Php,
            "python" | "py" => Language::Python,
            "shell" | "bash" | "sh" | "zsh" => Language::Shell,
            "vb" | "vbnet" | "vbscript" | "vba" => Language::VisualBasic,
            "sql" => Language::Sql,
            "css" | "scss" | "less" => Language::Css,
            "yaml" | "yml" => Language::Yaml,
            "html" | "htm" | "xml" | "vue" | "svg" => Language::Html,
            _ => return None,
        };
        Some(lang)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Json => "json",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Php => "php",
            Language::Python => "python",
            Language::Shell => "shell",
            Language::VisualBasic => "vb",
            Language::Sql => "sql",
            Language::Css => "css",
            Language::Yaml => "yaml",
            Language::Html => "html",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn profile(self) -> Option<Profile> {
        use keywords as kw;
        let profile = match self {
            Language::JavaScript => Profile {
                quotes: &['"', '\'', '`'],
                regex_literals: true,
                ..Profile::c_family(kw::JAVASCRIPT.to_vec())
            },
            Language::TypeScript => Profile {
                quotes: &['"', '\'', '`'],
                regex_literals: true,
                ..Profile::c_family([kw::JAVASCRIPT, kw::TYPESCRIPT_EXTRA].concat())
            },
            Language::Json => Profile {
                quotes: &['"'],
                ..Profile::c_family(kw::JSON.to_vec())
            },
            Language::Java => Profile::c_family(kw::JAVA.to_vec()),
            Language::C => Profile::c_family(kw::C.to_vec()),
            Language::Cpp => Profile::c_family([kw::C, kw::CPP_EXTRA].concat()),
            Language::CSharp => Profile::c_family(kw::CSHARP.to_vec()),
            Language::Go => Profile {
                quotes: &['"', '\'', '`'],
                ..Profile::c_family(kw::GO.to_vec())
            },
            Language::Rust => Profile {
                quotes: &['"'],
                ..Profile::c_family(kw::RUST.to_vec())
            },
            Language::Swift => Profile::c_family(kw::SWIFT.to_vec()),
            Language::Kotlin => Profile::c_family(kw::KOTLIN.to_vec()),
            Language::Php => Profile {
                line_comments: &["//", "#"],
                ..Profile::c_family(kw::PHP.to_vec())
            },
            Language::Python => Profile {
                line_comments: &["#"],
                block_comment: None,
                ..Profile::c_family(kw::PYTHON.to_vec())
            },
            Language::Shell => Profile {
                line_comments: &["#"],
                block_comment: None,
                ..Profile::c_family(kw::SHELL.to_vec())
            },
            Language::VisualBasic => Profile {
                line_comments: &["'"],
                block_comment: None,
                quotes: &['"'],
                ..Profile::c_family(kw::VISUAL_BASIC.to_vec())
            },
            Language::Sql => Profile {
                line_comments: &["--"],
                quotes: &['\'', '"'],
                case_insensitive: true,
                ..Profile::c_family(kw::SQL.to_vec())
            },
            Language::Css | Language::Yaml | Language::Html => return None,
        };
        Some(profile)
    }

    fn build_table(self) -> RuleTable {
        match self {
            Language::Css => css::table(),
            Language::Yaml => yaml::table(),
            Language::Html => html::table(),
            keyword_aware => {
                let profile = keyword_aware.profile().unwrap_or_else(|| Profile::c_family(Vec::new()));
                expression::table(keyword_aware.name(), &profile)
            }
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Lazily built, immutable rule tables for every [`Language`].
pub struct Highlighter {
    tables: Vec<OnceCell<RuleTable>>,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter {
    pub fn new() -> Self {
        Self {
            tables: Language::ALL.iter().map(|_| OnceCell::new()).collect(),
        }
    }

    /// The table for `lang`, building it on first use.
    pub fn table(&self, lang: Language) -> &RuleTable {
        self.tables[lang.index()].get_or_init(|| lang.build_table())
    }

    /// Highlight `code` for the fence tag `lang`. Unknown tags fall back to
    /// escaped plain text.
    pub fn highlight(&self, lang: &str, code: &str) -> String {
        match Language::from_name(lang) {
            Some(language) => self.highlight_as(language, code),
            None => {
                if !lang.trim().is_empty() {
                    debug!(lang, "no rule table for language; rendering plain text");
                }
                escape_html(code)
            }
        }
    }

    pub fn highlight_as(&self, lang: Language, code: &str) -> String {
        match lang {
            Language::Html => html::highlight(self, code),
            other => self.table(other).run(code),
        }
    }

    /// Number of tables built so far.
    pub fn built(&self) -> usize {
        self.tables.iter().filter(|cell| cell.get().is_some()).count()
    }
}

impl std::fmt::Debug for Highlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Highlighter").field("built", &self.built()).finish()
    }
}
