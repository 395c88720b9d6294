use rpnc::ast::{Definition, Node};
use rpnc::backend::Backend;
use rpnc::builtins::Builtin;
use rpnc::codegen::{CodeGenerator, CodegenError};
use rpnc::error::Error;
use rpnc::parser::{ParseError, Parser};
use rpnc::session::Session;
use rpnc::tokenizer::Tokenizer;
use target_lexicon::Triple;

fn compile(source: &str) -> Result<rpnc::CompiledUnit, Error> {
    let session = Session::batch(None)?;
    let mut parser = Parser::new(Tokenizer::new(source.chars()));
    session.compile(&mut parser)
}

fn definition(name: &str, recursive: bool, body: Vec<Node>) -> Definition {
    Definition {
        name: name.to_string(),
        recursive,
        locals: vec![],
        body,
    }
}

// ============================================================================
// BATCH COMPILATION
// ============================================================================

#[test]
fn test_batch_listing() {
    let unit = compile(": double { x } x x + ; 5 double .").unwrap();

    assert!(unit.listing.contains("; main\n"));
    assert!(unit.listing.contains("; double\n"));
    assert!(unit.listing.contains("; +\n"));
    assert!(unit.listing.contains("; push\n"));
    assert!(unit.listing.contains("; pop\n"));
    assert!(!unit.object.is_empty());
}

#[test]
fn test_batch_listing_in_definition_order() {
    let unit = compile(": a 1 ; : b a a + ; b .").unwrap();
    let a = unit.listing.find("; a\n").unwrap();
    let b = unit.listing.find("; b\n").unwrap();
    let main = unit.listing.find("; main\n").unwrap();
    assert!(a < b);
    assert!(b < main);
}

#[test]
fn test_batch_listing_is_clif() {
    let unit = compile("1 2 + .").unwrap();
    assert!(unit.listing.contains("function "));
    assert!(unit.listing.contains("f64const"));
    assert!(unit.listing.contains("return"));
}

#[test]
fn test_batch_all_constructs() {
    let source = "
        ( everything at once )
        : fact recursive dup 1 > if dup 1 - recurse * then ;
        : countdown { n } n begin dup 0 > while dup . 1 - again drop ;
        5 fact . 3 countdown
        2 begin dup while 1 - again drop .s";
    let unit = compile(source).unwrap();
    assert!(unit.listing.contains("; fact\n"));
    assert!(unit.listing.contains("; countdown\n"));
}

/// Number of basic blocks in the function listed under `label`.
fn block_count(listing: &str, label: &str) -> usize {
    let start = listing.find(&format!("; {}\n", label)).unwrap();
    let function = &listing[start..];
    let end = function.find("\n}\n").unwrap();
    function[..end]
        .lines()
        .filter(|line| line.starts_with("block"))
        .count()
}

#[test]
fn test_if_without_else_branches_to_merge() {
    let without_else = compile(": f if 1 then ; 0 f").unwrap();
    let with_else = compile(": f if 1 else 2 then ; 0 f").unwrap();
    // Only the else-branch gets a block of its own
    assert_eq!(
        block_count(&without_else.listing, "f") + 1,
        block_count(&with_else.listing, "f")
    );
}

#[test]
fn test_batch_error_aborts() {
    assert!(matches!(
        compile(": broken 1 2 +"),
        Err(Error::Parse(ParseError::UnterminatedDefinition))
    ));
    assert!(matches!(
        compile("1 2 frob"),
        Err(Error::Parse(ParseError::UnknownWord(_)))
    ));
}

#[test]
fn test_batch_for_host_triple() {
    let session = Session::batch(Some(&Triple::host())).unwrap();
    let mut parser = Parser::new(Tokenizer::new("1 .".chars()));
    let unit = session.compile(&mut parser).unwrap();
    assert!(!unit.object.is_empty());
}

#[test]
fn test_unsupported_target() {
    let triple: Triple = "riscv32imac-unknown-none-elf".parse().unwrap();
    assert!(matches!(Session::batch(Some(&triple)), Err(Error::BackendInit(_))));
}

#[test]
fn test_compile_needs_batch_session() {
    let session = Session::interactive().unwrap();
    let mut parser = Parser::new(Tokenizer::new("1".chars()));
    assert!(matches!(session.compile(&mut parser), Err(Error::WrongMode(_))));
}

// ============================================================================
// CODE GENERATOR
// ============================================================================

#[test]
fn test_builtins_registered() {
    let generator = CodeGenerator::new(Backend::object(None).unwrap(), false).unwrap();
    for builtin in Builtin::ALL {
        assert!(
            generator.words().lookup(builtin.name()).is_some(),
            "{} not registered",
            builtin.name()
        );
    }
    assert_eq!(generator.words().len(), Builtin::ALL.len());
    assert!(generator.listing().is_empty());
}

#[test]
fn test_builtin_names_round_trip() {
    for builtin in Builtin::ALL {
        assert_eq!(Builtin::from_name(builtin.name()), Some(builtin));
    }
    assert_eq!(Builtin::from_name("frob"), None);
}

#[test]
fn test_undefined_word_restores_previous_binding() {
    let mut generator = CodeGenerator::new(Backend::jit().unwrap(), false).unwrap();
    let first = generator
        .generate_definition(&definition("f", false, vec![Node::Number(1.0)]))
        .unwrap();

    let broken = definition("f", true, vec![Node::WordCall("nope".to_string())]);
    let result = generator.generate_definition(&broken);
    assert!(matches!(result, Err(CodegenError::UndefinedWord(ref w)) if w == "nope"));
    assert_eq!(generator.words().lookup("f"), Some(first));
}

#[test]
fn test_failed_definition_is_not_bound() {
    let mut generator = CodeGenerator::new(Backend::jit().unwrap(), false).unwrap();
    let broken = definition("g", false, vec![Node::LocalRef("zz".to_string())]);
    assert!(matches!(
        generator.generate_definition(&broken),
        Err(CodegenError::UnknownLocal(_))
    ));
    assert!(!generator.words().contains("g"));
}

#[test]
fn test_unbalanced_loops_rejected() {
    let mut generator = CodeGenerator::new(Backend::jit().unwrap(), false).unwrap();
    for body in [vec![Node::LoopAgain], vec![Node::LoopWhile], vec![Node::LoopBegin]] {
        assert!(matches!(
            generator.generate_definition(&definition("l", false, body)),
            Err(CodegenError::UnbalancedLoop)
        ));
    }
}

#[test]
fn test_recursive_definition_bound_to_itself() {
    let mut generator = CodeGenerator::new(Backend::jit().unwrap(), false).unwrap();
    let body = vec![
        Node::WordCall("dup".to_string()),
        Node::Conditional {
            then_branch: vec![
                Node::Number(1.0),
                Node::WordCall("-".to_string()),
                Node::WordCall("down".to_string()),
            ],
            else_branch: vec![],
        },
    ];
    let id = generator
        .generate_definition(&definition("down", true, body))
        .unwrap();
    assert_eq!(generator.words().lookup("down"), Some(id));
}

#[test]
fn test_anonymous_units_get_distinct_functions() {
    let mut generator = CodeGenerator::new(Backend::jit().unwrap(), false).unwrap();
    let a = generator.generate_anonymous(&[Node::Number(1.0)]).unwrap();
    let b = generator.generate_anonymous(&[Node::Number(1.0)]).unwrap();
    assert_ne!(a, b);
    generator.finalize().unwrap();
}
