//! Static validators for reduced test cases.
//!
//! Two families live here. Textual checks look only at the source and make
//! sure a reduction step kept the harness contract intact (work-size
//! header, result buffer indexing, the linear index helper). Tool checks run
//! the compiler or the static analyzer once and reject the case when the
//! output mentions undefined or non-portable behaviour from the denylist.

use crate::config::ExecutionConfig;
use crate::process::{Invocation, ProcessRunner};
use crate::test_case::{self, TestCase};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Output a denylist entry is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Compiler AST dump, matched against stdout
    AstDump,
    /// Compiler with all warnings, matched against stderr
    Compiler,
    /// Static analyzer, matched against stderr
    Analyzer,
}

/// A diagnostic substring that invalidates a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denylisted {
    /// Tool whose output is searched
    pub tool: Tool,
    /// Exact substring
    pub needle: &'static str,
    /// What the diagnostic indicates
    pub meaning: &'static str,
}

const fn deny(tool: Tool, needle: &'static str, meaning: &'static str) -> Denylisted {
    Denylisted {
        tool,
        needle,
        meaning,
    }
}

/// Every diagnostic that disqualifies a test case
pub const DENYLIST: &[Denylisted] = &[
    deny(Tool::AstDump, "PointerToIntegral", "pointer to integral coercion"),
    deny(Tool::Compiler, "warning: empty struct is a GNU extension", "GNU empty struct"),
    deny(Tool::Compiler, "warning: use of GNU empty initializer extension", "GNU empty initializer"),
    deny(Tool::Compiler, "warning: incompatible pointer to integer conversion", "pointer to integer conversion"),
    deny(Tool::Compiler, "warning: incompatible integer to pointer conversion", "integer to pointer conversion"),
    deny(Tool::Compiler, "warning: incompatible pointer types initializing", "incompatible pointer initialization"),
    deny(Tool::Compiler, "warning: comparison between pointer and integer", "pointer/integer comparison"),
    deny(Tool::Compiler, "warning: ordered comparison between pointer and integer", "ordered pointer/integer comparison"),
    deny(Tool::Compiler, "warning: ordered comparison between pointer and zero", "ordered pointer/zero comparison"),
    deny(Tool::Compiler, "is uninitialized when used within its own initialization [-Wuninitialized]", "self-initialization"),
    deny(Tool::Compiler, "is uninitialized when used here [-Wuninitialized]", "uninitialized use"),
    deny(Tool::Compiler, "may be uninitialized when used here [-Wconditional-uninitialized]", "conditionally uninitialized use"),
    deny(Tool::Compiler, "warning: use of GNU ?: conditional expression extension, omitting middle operand", "GNU elvis operator"),
    deny(Tool::Compiler, "warning: control may reach end of non-void function [-Wreturn-type]", "possible missing return"),
    deny(Tool::Compiler, "warning: control reaches end of non-void function [-Wreturn-type]", "missing return"),
    deny(Tool::Compiler, "warning: zero size arrays are an extension [-Wzero-length-array]", "zero-length array"),
    deny(Tool::Compiler, "excess elements in ", "excess initializer elements"),
    deny(Tool::Compiler, "warning: address of stack memory associated with local variable", "stack address escape"),
    deny(Tool::Compiler, "warning: type specifier missing", "missing type specifier"),
    deny(Tool::Compiler, "warning: expected ';' at end of declaration list", "malformed declaration"),
    deny(Tool::Compiler, " declaration specifier [-Wduplicate-decl-specifier]", "duplicate declaration specifier"),
    deny(Tool::Analyzer, "warning: Assigned value is garbage or undefined", "garbage assignment"),
    deny(Tool::Analyzer, "warning: Undefined or garbage value returned to caller", "garbage return"),
    deny(Tool::Analyzer, "is a garbage value", "garbage operand"),
    deny(Tool::Analyzer, "warning: Function call argument is an uninitialized value", "uninitialized argument"),
    deny(Tool::Analyzer, "warning: Dereference of null pointer", "null dereference"),
    deny(Tool::Analyzer, "warning: Array subscript is undefined", "undefined array subscript"),
    deny(Tool::Analyzer, "results in a dereference of a null pointer", "null dereference"),
];

/// Flags passed to every compiler invocation
pub const COMPILER_FLAGS: &[&str] = &[
    "-x",
    "cl",
    "-fno-builtin",
    "-include",
    "clc/clc.h",
    "-Dcl_clang_storage_class_specifiers",
    "-g",
    "-c",
    "-Wall",
    "-Wextra",
    "-pedantic",
    "-Wconditional-uninitialized",
    "-Weverything",
    "-Wno-reserved-id-macro",
    "-fno-caret-diagnostics",
    "-fno-diagnostics-fixit-info",
    "-O1",
];

/// Extra flags that turn the compiler into the static analyzer
pub const ANALYZER_FLAGS: &[&str] = &[
    "--analyze",
    "-Xclang",
    "-analyzer-checker",
    "-Xclang",
    "alpha,core,security,unix",
];

/// Extra flags that dump the AST
pub const AST_DUMP_FLAGS: &[&str] = &["-Xclang", "-ast-dump"];

/// First denylist entry for `tool` found in `output`
#[must_use]
pub fn find_denylisted(tool: Tool, output: &str) -> Option<&'static Denylisted> {
    DENYLIST
        .iter()
        .filter(|entry| entry.tool == tool)
        .find(|entry| output.contains(entry.needle))
}

#[allow(clippy::expect_used)]
fn result_access_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"result\s*\[").expect("valid result access regex"))
}

#[allow(clippy::expect_used)]
fn canonical_access_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*get_linear_global_id\s*\(\s*\)\s*\]").expect("valid canonical access regex")
    })
}

#[allow(clippy::expect_used)]
fn linear_index_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"return\s*\(\s*get_global_id\s*\(\s*2\s*\)\s*\*\s*get_global_size\s*\(\s*1\s*\)\s*\+\s*get_global_id\s*\(\s*1\s*\)\s*\)\s*\*\s*get_global_size\s*\(\s*0\s*\)\s*\+\s*get_global_id\s*\(\s*0\s*\)\s*;",
        )
        .expect("valid linear index regex")
    })
}

/// Every `result[` subscript is `get_linear_global_id()`.
///
/// Sources without any `result[` pass vacuously.
#[must_use]
pub fn is_valid_result_access(content: &str) -> bool {
    result_access_regex()
        .find_iter(content)
        .all(|m| canonical_access_regex().is_match(&content[m.end()..]))
}

/// The linear index helper still composes the ids row-major.
#[must_use]
pub fn has_intact_linear_index(content: &str) -> bool {
    linear_index_regex().is_match(content)
}

/// Header, result-access and index-function checks together
#[must_use]
pub fn is_valid_launcher_test_case(content: &str) -> bool {
    if !test_case::has_valid_header(content) {
        debug!("rejected: missing work-size header");
        return false;
    }
    if !is_valid_result_access(content) {
        debug!("rejected: non-canonical result access");
        return false;
    }
    if !has_intact_linear_index(content) {
        debug!("rejected: linear index helper altered");
        return false;
    }
    true
}

/// Build a compiler invocation for `test_case` with `extra` flags
#[must_use]
pub fn compiler_invocation(config: &ExecutionConfig, test_case: &TestCase, extra: &[&str]) -> Invocation {
    let mut invocation = Invocation::new(&config.clang)
        .args(COMPILER_FLAGS.iter().copied())
        .with_timeout(config.timeout());
    if let Some(include) = &config.libclc_include_path {
        invocation = invocation.arg("-I").arg(include);
    }
    invocation
        .args(extra.iter().copied())
        .arg(test_case.path_arg())
}

/// Compiler and analyzer based checks
#[derive(Debug)]
pub struct StaticChecker<'a, R: ProcessRunner> {
    runner: &'a R,
    config: &'a ExecutionConfig,
}

impl<'a, R: ProcessRunner> StaticChecker<'a, R> {
    /// Create a checker over `runner`
    #[must_use]
    pub const fn new(runner: &'a R, config: &'a ExecutionConfig) -> Self {
        Self { runner, config }
    }

    fn clean(&self, test_case: &TestCase, tool: Tool, extra: &[&str]) -> bool {
        let invocation = compiler_invocation(self.config, test_case, extra);
        let outcome = self.runner.run(&invocation);
        let Some(result) = outcome.successful() else {
            debug!(?tool, ?outcome, "static check tool failed");
            return false;
        };
        let output = match tool {
            Tool::AstDump => &result.stdout,
            Tool::Compiler | Tool::Analyzer => &result.stderr,
        };
        match find_denylisted(tool, output) {
            Some(hit) => {
                debug!(?tool, meaning = hit.meaning, "denylisted diagnostic");
                false
            }
            None => true,
        }
    }

    /// The AST dump succeeds and shows no pointer to integral coercion
    pub fn is_valid_ast(&self, test_case: &TestCase) -> bool {
        self.clean(test_case, Tool::AstDump, AST_DUMP_FLAGS)
    }

    /// The compiler succeeds without denylisted warnings
    pub fn is_valid_compiler(&self, test_case: &TestCase) -> bool {
        self.clean(test_case, Tool::Compiler, &[])
    }

    /// The static analyzer succeeds without denylisted findings
    pub fn is_valid_analysis(&self, test_case: &TestCase) -> bool {
        self.clean(test_case, Tool::Analyzer, ANALYZER_FLAGS)
    }

    /// AST, compiler and analyzer checks, stopping at the first failure
    pub fn is_statically_valid(&self, test_case: &TestCase) -> bool {
        self.is_valid_ast(test_case)
            && self.is_valid_compiler(test_case)
            && self.is_valid_analysis(test_case)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::process::{ProcessOutcome, ProcessResult, ScriptedRunner};
    use proptest::prelude::*;

    const INDEX_FN: &str = "size_t get_linear_global_id(void) {\n    return (get_global_id(2) * get_global_size(1) + get_global_id(1)) * get_global_size(0) + get_global_id(0);\n}\n";

    fn test_case() -> TestCase {
        TestCase::new("CLProg_7.cl", "// seed -g 1,1,1 -l 1,1,1\n")
    }

    fn completed(result: ProcessResult) -> ProcessOutcome {
        ProcessOutcome::Completed(result)
    }

    #[test]
    fn test_result_access_vacuous_pass() {
        assert!(is_valid_result_access("kernel void k(global ulong *out) {}"));
    }

    #[test]
    fn test_result_access_canonical() {
        assert!(is_valid_result_access(
            "result[get_linear_global_id()] = c;\nresult [ get_linear_global_id ( ) ] = d;"
        ));
    }

    #[test]
    fn test_result_access_other_subscript() {
        assert!(!is_valid_result_access("result[0] = c;"));
        assert!(!is_valid_result_access(
            "result[get_linear_global_id()] = c;\nresult[get_global_id(0)] = d;"
        ));
    }

    #[test]
    fn test_linear_index_intact() {
        assert!(has_intact_linear_index(INDEX_FN));
        assert!(has_intact_linear_index(
            "return(get_global_id(2)*get_global_size(1)+get_global_id(1))*get_global_size(0)+get_global_id(0);"
        ));
    }

    #[test]
    fn test_linear_index_altered() {
        assert!(!has_intact_linear_index(
            "return (get_global_id(1) * get_global_size(1) + get_global_id(1)) * get_global_size(0) + get_global_id(0);"
        ));
        assert!(!has_intact_linear_index("return 0;"));
    }

    #[test]
    fn test_launcher_test_case() {
        let good = format!("// seed -g 4,4,4 -l 2,2,2\n{INDEX_FN}result[get_linear_global_id()] = 1;\n");
        assert!(is_valid_launcher_test_case(&good));

        let no_header = format!("// seed\n{INDEX_FN}");
        assert!(!is_valid_launcher_test_case(&no_header));

        let bad_access = format!("// seed -g 4,4,4 -l 2,2,2\n{INDEX_FN}result[1] = 1;\n");
        assert!(!is_valid_launcher_test_case(&bad_access));

        assert!(!is_valid_launcher_test_case("// seed -g 4,4,4 -l 2,2,2\n"));
    }

    #[test]
    fn test_denylist_is_per_tool() {
        let stderr = "k.cl:3:5: warning: Dereference of null pointer";
        assert!(find_denylisted(Tool::Compiler, stderr).is_none());
        assert_eq!(
            find_denylisted(Tool::Analyzer, stderr).map(|d| d.meaning),
            Some("null dereference")
        );
    }

    #[test]
    fn test_compiler_invocation_flags() {
        let mut config = ExecutionConfig::default();
        config.libclc_include_path = Some("/opt/libclc".into());
        let inv = compiler_invocation(&config, &test_case(), AST_DUMP_FLAGS);
        assert_eq!(inv.program, "clang");
        assert_eq!(&inv.args[..2], ["-x", "cl"]);
        let include = inv.args.iter().position(|a| a == "-I").unwrap();
        assert_eq!(inv.args[include + 1], "/opt/libclc");
        assert!(inv.has_arg("-ast-dump"));
        assert_eq!(inv.args.last().unwrap(), "CLProg_7.cl");
        assert_eq!(inv.timeout, config.timeout());
    }

    #[test]
    fn test_ast_rejects_pointer_to_integral() {
        let runner = ScriptedRunner::new().on(
            |inv| inv.has_arg("-ast-dump"),
            completed(ProcessResult::ok("ImplicitCastExpr <PointerToIntegral>")),
        );
        let config = ExecutionConfig::default();
        assert!(!StaticChecker::new(&runner, &config).is_valid_ast(&test_case()));
    }

    #[test]
    fn test_compiler_failure_is_invalid() {
        let runner = ScriptedRunner::new().otherwise(completed(ProcessResult::exited(1)));
        let config = ExecutionConfig::default();
        assert!(!StaticChecker::new(&runner, &config).is_valid_compiler(&test_case()));
    }

    #[test]
    fn test_timeout_is_invalid() {
        let runner = ScriptedRunner::new().otherwise(ProcessOutcome::TimedOut);
        let config = ExecutionConfig::default();
        assert!(!StaticChecker::new(&runner, &config).is_valid_analysis(&test_case()));
    }

    #[test]
    fn test_statically_valid_short_circuits() {
        let runner = ScriptedRunner::new()
            .on(|inv| inv.has_arg("-ast-dump"), completed(ProcessResult::exited(1)))
            .otherwise(completed(ProcessResult::ok("")));
        let config = ExecutionConfig::default();
        assert!(!StaticChecker::new(&runner, &config).is_statically_valid(&test_case()));
        assert_eq!(runner.call_count(), 1);
    }

    #[test]
    fn test_statically_valid_runs_all_three() {
        let runner = ScriptedRunner::new().otherwise(completed(
            ProcessResult::ok("").with_stderr("k.cl:1:1: warning: unused variable 'x'"),
        ));
        let config = ExecutionConfig::default();
        assert!(StaticChecker::new(&runner, &config).is_statically_valid(&test_case()));
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].has_arg("-ast-dump"));
        assert!(!calls[1].has_arg("--analyze") && !calls[1].has_arg("-ast-dump"));
        assert!(calls[2].has_arg("--analyze"));
    }

    fn compiler_verdict(stderr: &str) -> bool {
        let runner = ScriptedRunner::new()
            .otherwise(completed(ProcessResult::ok("").with_stderr(stderr)));
        let config = ExecutionConfig::default();
        StaticChecker::new(&runner, &config).is_valid_compiler(&test_case())
    }

    #[test]
    fn test_compiler_empty_stderr_is_clean() {
        assert!(compiler_verdict(""));
    }

    proptest! {
        #[test]
        fn prop_compiler_rejects_any_denylisted_needle(
            idx in 0..DENYLIST.len(),
            prefix in "[a-z0-9 :.]{0,30}",
            suffix in "[a-z0-9 :.]{0,30}",
        ) {
            let entry = DENYLIST[idx];
            let stderr = format!("{prefix}{}{suffix}", entry.needle);
            prop_assert_eq!(compiler_verdict(&stderr), entry.tool != Tool::Compiler);
        }

        #[test]
        fn prop_compiler_accepts_text_without_needles(stderr in "[a-z0-9 :.\n]{0,200}") {
            prop_assume!(find_denylisted(Tool::Compiler, &stderr).is_none());
            prop_assert!(compiler_verdict(&stderr));
        }

        #[test]
        fn prop_non_canonical_subscript_rejected(subscript in "[a-z0-9_+*]{1,12}") {
            prop_assume!(subscript != "get_linear_global_id()");
            let content = format!("result[{subscript}] = 1;");
            prop_assert!(!is_valid_result_access(&content));
        }
    }
}
