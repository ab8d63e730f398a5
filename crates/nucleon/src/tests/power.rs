use crate::power::Insomnia;

#[test]
fn guards_nest_and_unwind() {
    let insomnia = Insomnia::new();
    assert!(insomnia.is_sleep_allowed());

    let outer = insomnia.enter();
    let inner = insomnia.enter();
    assert_eq!(insomnia.level(), 2);
    drop(inner);
    assert!(!insomnia.is_sleep_allowed());
    drop(outer);
    assert!(insomnia.is_sleep_allowed());
}

#[test]
fn leaked_level_is_given_back_by_exit() {
    let insomnia = Insomnia::new();
    insomnia.enter().leak();
    assert_eq!(insomnia.level(), 1);
    insomnia.exit();
    assert_eq!(insomnia.level(), 0);
}

#[test]
#[should_panic(expected = "more times than entered")]
fn exit_without_enter_is_fatal() {
    Insomnia::new().exit();
}
