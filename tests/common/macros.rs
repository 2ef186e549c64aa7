#[macro_export]
macro_rules! util_name {
    () => {
        "tail"
    };
}

#[macro_export]
macro_rules! new_ucmd {
    () => {
        crate::common::util::TestScenario::new(util_name!()).ucmd()
    };
}

#[macro_export]
macro_rules! at_and_ucmd {
    () => {{
        let ts = crate::common::util::TestScenario::new(util_name!());
        (ts.fixtures.clone(), ts.ucmd())
    }};
}
