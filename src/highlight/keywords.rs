//! Fixed keyword sets for the keyword-aware languages.

pub const JAVASCRIPT: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "export", "extends", "false", "finally", "for", "from",
    "function", "get", "if", "import", "in", "instanceof", "let", "new", "null", "of", "return",
    "set", "static", "super", "switch", "this", "throw", "true", "try", "typeof", "undefined",
    "var", "void", "while", "with", "yield",
];

pub const TYPESCRIPT_EXTRA: &[&str] = &[
    "abstract", "any", "as", "boolean", "declare", "enum", "implements", "interface", "keyof",
    "namespace", "never", "number", "private", "protected", "public", "readonly", "string",
    "type", "unknown",
];

pub const JSON: &[&str] = &["true", "false", "null"];

pub const JAVA: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final",
    "finally", "float", "for", "goto", "if", "implements", "import", "instanceof", "int",
    "interface", "long", "native", "new", "null", "package", "private", "protected", "public",
    "record", "return", "short", "static", "super", "switch", "synchronized", "this", "throw",
    "throws", "transient", "true", "try", "var", "void", "volatile", "while",
];

pub const C: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "NULL",
];

pub const CPP_EXTRA: &[&str] = &[
    "bool", "catch", "class", "constexpr", "delete", "explicit", "false", "friend", "mutable",
    "namespace", "new", "noexcept", "nullptr", "operator", "override", "private", "protected",
    "public", "template", "this", "throw", "true", "try", "typename", "using", "virtual",
];

pub const CSHARP: &[&str] = &[
    "abstract", "as", "async", "await", "base", "bool", "break", "byte", "case", "catch",
    "char", "class", "const", "continue", "decimal", "default", "delegate", "do", "double",
    "else", "enum", "event", "false", "finally", "float", "for", "foreach", "get", "if", "in",
    "int", "interface", "internal", "is", "lock", "long", "namespace", "new", "null", "object",
    "out", "override", "private", "protected", "public", "readonly", "ref", "return", "sealed",
    "set", "static", "string", "struct", "switch", "this", "throw", "true", "try", "typeof",
    "using", "var", "virtual", "void", "while",
];

pub const GO: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "false", "for", "func", "go", "goto", "if", "import", "interface", "iota", "map", "nil",
    "package", "range", "return", "select", "struct", "switch", "true", "type", "var",
];

pub const RUST: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while",
];

pub const SWIFT: &[&str] = &[
    "as", "break", "case", "catch", "class", "continue", "default", "defer", "do", "else",
    "enum", "extension", "false", "fileprivate", "for", "func", "guard", "if", "import", "in",
    "init", "internal", "is", "let", "nil", "private", "protocol", "public", "repeat", "return",
    "self", "static", "struct", "switch", "throw", "throws", "true", "try", "var", "where",
    "while",
];

pub const KOTLIN: &[&str] = &[
    "as", "break", "class", "continue", "data", "do", "else", "false", "for", "fun", "if",
    "import", "in", "interface", "is", "null", "object", "override", "package", "private",
    "public", "return", "sealed", "super", "this", "throw", "true", "try", "val", "var", "when",
    "while",
];

pub const PHP: &[&str] = &[
    "abstract", "array", "as", "break", "case", "catch", "class", "const", "continue",
    "default", "do", "echo", "else", "elseif", "extends", "false", "final", "finally", "fn",
    "for", "foreach", "function", "global", "if", "implements", "include", "interface", "match",
    "namespace", "new", "null", "private", "protected", "public", "require", "return",
    "static", "switch", "throw", "true", "try", "use", "while",
];

pub const PYTHON: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "self", "try", "while", "with", "yield",
];

pub const SHELL: &[&str] = &[
    "case", "do", "done", "echo", "elif", "else", "esac", "exit", "export", "fi", "for",
    "function", "if", "in", "local", "read", "return", "set", "then", "until", "while",
];

pub const VISUAL_BASIC: &[&str] = &[
    "And", "As", "Boolean", "ByRef", "ByVal", "Call", "Case", "Class", "Const", "Dim", "Do",
    "Double", "Each", "Else", "ElseIf", "End", "Exit", "False", "For", "Function", "If", "In",
    "Integer", "Is", "Loop", "Me", "Module", "New", "Next", "Not", "Nothing", "Object", "Or",
    "Private", "Public", "ReDim", "Return", "Select", "Set", "String", "Sub", "Then", "To",
    "True", "Until", "Wend", "While", "With",
];

/// Stored lower-case; SQL matching ignores case.
pub const SQL: &[&str] = &[
    "add", "all", "alter", "and", "as", "asc", "between", "by", "case", "create", "delete",
    "desc", "distinct", "drop", "else", "end", "exists", "from", "group", "having", "in",
    "index", "inner", "insert", "into", "is", "join", "left", "like", "limit", "not", "null",
    "on", "or", "order", "outer", "primary", "key", "right", "select", "set", "table", "then",
    "union", "update", "values", "when", "where", "with",
];
