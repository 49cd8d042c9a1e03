use clausal::{FieldMap, Predicate, Record, Value};

fn times_ten() -> Predicate {
    Predicate::leaf("times_ten", FieldMap::identity(["input", "output"]).expect("valid"), |view| {
        let Some(input) = view.get("input").and_then(|v| v.as_i64()) else {
            return Ok(false);
        };
        view.set("output", input * 10)?;
        Ok(true)
    })
}

#[test]
fn outputs_come_back_under_the_callers_names() {
    let call = Predicate::call(
        "scale",
        times_ten(),
        FieldMap::new([("input", "a"), ("output", "out")]).expect("valid"),
    );
    let answer = call
        .solve(&Record::new().with("a", 1).with_null("out"))
        .expect("no error")
        .expect("an answer");
    assert_eq!(answer, Record::new().with("a", 1).with("out", 10));
}

#[test]
fn rebinding_a_parameter_only_touches_its_mapped_field() {
    let rebind = Predicate::leaf("rebind", FieldMap::identity(["a"]).expect("valid"), |view| {
        view.set("a", 50)?;
        Ok(true)
    });
    let call = Predicate::call("sub", rebind, FieldMap::new([("a", "b")]).expect("valid"));
    let answer = call
        .solve(&Record::new().with("a", 1).with("b", 2))
        .expect("no error")
        .expect("an answer");
    assert_eq!(answer, Record::new().with("a", 1).with("b", 50));
}

#[test]
fn body_sees_only_mapped_fields() {
    let peek = Predicate::leaf("peek", FieldMap::identity(["x", "hidden"]).expect("valid"), |view| {
        Ok(view.get("x") == Some(Value::Int(1)) && view.get("hidden").is_none())
    });
    let call = Predicate::call("sub", peek, FieldMap::new([("x", "a")]).expect("valid"));
    let answer = call
        .solve(&Record::new().with("a", 1).with("hidden", 2))
        .expect("no error");
    assert!(answer.is_some());
}

#[test]
fn nested_calls_propagate_outward() {
    let first = Predicate::call(
        "first",
        times_ten(),
        FieldMap::new([("input", "input"), ("output", "mid")]).expect("valid"),
    );
    let second = Predicate::call(
        "second",
        times_ten(),
        FieldMap::new([("input", "mid"), ("output", "output")]).expect("valid"),
    );
    let outer = Predicate::call(
        "outer",
        first.and(&second),
        FieldMap::new([("input", "start"), ("mid", "scratch"), ("output", "end")]).expect("valid"),
    );
    let answer = outer
        .solve(&Record::new().with("start", 2).with_null("end"))
        .expect("no error")
        .expect("an answer");
    assert_eq!(answer.get("start"), Some(&Value::Int(2)));
    assert_eq!(answer.get("scratch"), Some(&Value::Int(20)));
    assert_eq!(answer.get("end"), Some(&Value::Int(200)));
}

#[test]
fn backtracking_reenters_a_called_scope() {
    let pick = Predicate::any([1, 2, 3].map(|n| {
        Predicate::leaf(format!("pick{}", n), FieldMap::identity(["v"]).expect("valid"), move |view| {
            view.set("v", n)?;
            Ok(true)
        })
    }));
    let call = Predicate::call("pick", pick, FieldMap::new([("v", "n")]).expect("valid"));
    let wants_two = Predicate::leaf("wants_two", FieldMap::identity(["n"]).expect("valid"), |view| {
        Ok(view.get("n") == Some(Value::Int(2)))
    });
    let mut thread = call.and(&wants_two).query(&Record::new().with_null("n"));
    let answers: Vec<Record> = thread.solutions().map(|a| a.expect("no error")).collect();
    assert_eq!(answers, vec![Record::new().with("n", 2)]);
}

#[test]
fn call_names_show_in_the_stack() {
    let call = Predicate::call(
        "scale",
        times_ten(),
        FieldMap::new([("input", "a"), ("output", "out")]).expect("valid"),
    );
    let mut thread = call.query(&Record::new().with("a", 3));
    thread.run().expect("no error").expect("an answer");
    assert_eq!(thread.stack_string(), "times_ten\nscale");
    assert_eq!(call.to_string(), "[Predicate scale(input=a, output=out)]");
}

#[test]
fn null_locals_stay_out_of_the_caller() {
    let scratch = |value: Option<i64>| {
        let body = Predicate::leaf("scratch", FieldMap::identity(["a", "tmp"]).expect("valid"), move |view| {
            if let Some(value) = value {
                view.set("tmp", value)?;
            }
            Ok(true)
        });
        Predicate::call("scratch", body, FieldMap::new([("a", "a"), ("tmp", "scratch")]).expect("valid"))
    };
    let answer = scratch(None).solve(&Record::new().with("a", 1)).expect("no error");
    assert_eq!(answer, Some(Record::new().with("a", 1)));

    // a caller that declared the field still gets it back, null or not
    let answer = scratch(None).solve(&Record::new().with("a", 1).with_null("scratch")).expect("no error");
    assert_eq!(answer, Some(Record::new().with("a", 1).with_null("scratch")));
    let answer = scratch(Some(2)).solve(&Record::new().with("a", 1)).expect("no error");
    assert_eq!(answer, Some(Record::new().with("a", 1).with("scratch", 2)));
}
