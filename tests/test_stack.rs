use rpnc::error::Error;
use rpnc::runtime;
use rpnc::session::Session;
use test_case::test_case;

fn session_with(source: &str) -> Session {
    let mut session = Session::interactive().unwrap();
    session.eval(source).unwrap();
    session
}

// ============================================================================
// CELL ACCOUNTING
// ============================================================================

#[test_case("1 2 3"; "pushes")]
#[test_case("1 2 3 + drop"; "pops")]
#[test_case("1 2 tuck nip over rot"; "shuffles")]
#[test_case("5 dup * 2 swap - negate"; "arithmetic")]
#[test_case("4 begin dup 0 > while dup 1 - again"; "loop")]
#[test_case(": f { a b } b a a ; 1 2 f"; "locals")]
#[test_case("1 2 3 .s . ."; "printing")]
fn test_live_cells_match_depth(source: &str) {
    let before = runtime::live_cells();
    let (session, _) = runtime::capture(|| session_with(source));
    assert_eq!(runtime::live_cells() - before, session.depth() as i64);
}

#[test]
fn test_dropping_session_releases_cells() {
    let before = runtime::live_cells();
    {
        let session = session_with("1 2 3 4");
        assert_eq!(runtime::live_cells() - before, 4);
        assert_eq!(session.depth(), 4);
    }
    assert_eq!(runtime::live_cells(), before);
}

#[test]
fn test_clear_stack_releases_cells() {
    let before = runtime::live_cells();
    let mut session = session_with("1 2 3");
    session.clear_stack().unwrap();
    assert_eq!(runtime::live_cells(), before);
}

// ============================================================================
// STACK LAWS
// ============================================================================

#[test]
fn test_swap_twice_is_identity() {
    let session = session_with("1 2 3 swap swap");
    assert_eq!(session.stack(), vec![3.0, 2.0, 1.0]);
}

#[test]
fn test_rot_three_times_is_identity() {
    let session = session_with("1 2 3 rot rot rot");
    assert_eq!(session.stack(), vec![3.0, 2.0, 1.0]);
}

#[test]
fn test_dup_drop_is_identity() {
    let session = session_with("4 5 dup drop");
    assert_eq!(session.stack(), vec![5.0, 4.0]);
}

#[test]
fn test_comparisons_yield_flags() {
    for a in [-2.0, 0.0, 1.5, 3.0] {
        for b in [-2.0, 0.0, 1.5, 3.0] {
            for op in ["<", ">", "="] {
                let session = session_with(&format!("{} {} {}", a, b, op));
                let flag = session.stack()[0];
                assert!(flag == 0.0 || flag == -1.0, "{} {} {} gave {}", a, b, op, flag);
            }
        }
    }
}

// ============================================================================
// UNDERFLOW
// ============================================================================

#[test_case("drop", 0; "drop on empty")]
#[test_case("1 +", 1; "binary with one value")]
#[test_case("1 2 rot", 2; "rot with two values")]
#[test_case(".", 0; "dot on empty")]
#[test_case("7 swap", 1; "swap with one value")]
fn test_underflow_leaves_stack_unchanged(source: &str, depth: usize) {
    let before = runtime::live_cells();
    let mut session = Session::interactive().unwrap();
    let result = session.eval(source);

    assert!(matches!(result, Err(Error::StackUnderflow)));
    assert_eq!(session.depth(), depth);
    assert_eq!(runtime::live_cells() - before, depth as i64);
}

#[test]
fn test_underflow_keeps_values_intact() {
    let mut session = Session::interactive().unwrap();
    session.eval("9").unwrap();
    assert!(session.eval("+").is_err());
    assert_eq!(session.stack(), vec![9.0]);
}

#[test]
fn test_condition_on_empty_stack() {
    let mut session = Session::interactive().unwrap();
    let (result, output) = runtime::capture(|| session.eval("if 1 . else 2 . then"));
    assert!(matches!(result, Err(Error::StackUnderflow)));
    // The missing value counts as false
    assert_eq!(output, "2.000000\n");
}

#[test]
fn test_locals_on_empty_stack() {
    let mut session = Session::interactive().unwrap();
    session.eval(": f { x } x ;").unwrap();
    assert!(matches!(session.eval("f"), Err(Error::StackUnderflow)));
    assert_eq!(session.stack(), vec![0.0]);
}

#[test]
fn test_session_usable_after_underflow() {
    let mut session = Session::interactive().unwrap();
    assert!(session.eval("drop").is_err());
    session.eval("2 3 *").unwrap();
    assert_eq!(session.stack(), vec![6.0]);
}
