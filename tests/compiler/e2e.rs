//! Compile small programs and run them on a local JVM. Skipped when no
//! `java` binary is on the path.

use super::*;

#[test]
fn loops_and_arithmetic_run() {
    if !java_available() {
        eprintln!("skipping: java not found");
        return;
    }
    let src = concat!(
        "class Main\n",
        "    static main(args:String[]):Unit\n",
        "        total = 0\n",
        "        for i in 1..4\n",
        "            total += i * i\n",
        "        System.out.println(\"total=\" + total)\n",
        "        n = 10L\n",
        "        System.out.println(n * 3 + 1)\n",
        "        k = 0\n",
        "        while k < 10\n",
        "            k += 3\n",
        "        System.out.println(k)\n",
    );
    let modules = compile_src(src);
    assert_eq!(run_main("loops", &modules, "Main"), "total=30\n31\n12");
}

#[test]
fn exceptions_unwind_through_finally() {
    if !java_available() {
        eprintln!("skipping: java not found");
        return;
    }
    let src = concat!(
        "class Main\n",
        "    static check(x:int):int\n",
        "        if x < 0\n",
        "            throw IllegalArgumentException(\"negative\")\n",
        "        return x * 2\n",
        "    static main(args:String[]):Unit\n",
        "        System.out.println(check(4))\n",
        "        try\n",
        "            check(-1)\n",
        "        catch e:IllegalArgumentException\n",
        "            System.out.println(\"caught \" + e.getMessage())\n",
        "        finally\n",
        "            System.out.println(\"done\")\n",
    );
    let modules = compile_src(src);
    assert_eq!(run_main("exceptions", &modules, "Main"), "8\ncaught negative\ndone");
}

#[test]
fn data_classes_behave_structurally() {
    if !java_available() {
        eprintln!("skipping: java not found");
        return;
    }
    let src = concat!(
        "package shapes\n",
        "data class Point(x:int, y:int)\n",
        "class Main\n",
        "    static main(args:String[]):Unit\n",
        "        p = Point(1, 2)\n",
        "        System.out.println(p)\n",
        "        System.out.println(p.equals(Point(1, 2)))\n",
        "        System.out.println(p.equals(Point(2, 1)))\n",
        "        System.out.println(p.getX() + p.getY())\n",
    );
    let modules = compile_src(src);
    assert_eq!(
        run_main("data_classes", &modules, "shapes.Main"),
        "Point(x=1, y=2)\ntrue\nfalse\n3"
    );
}

#[test]
fn break_and_continue_leave_the_counter_loop() {
    if !java_available() {
        eprintln!("skipping: java not found");
        return;
    }
    let src = concat!(
        "class Main\n",
        "    static main(args:String[]):Unit\n",
        "        upTo = 0\n",
        "        for i in 1..10\n",
        "            if i == 7\n",
        "                break\n",
        "            upTo += i\n",
        "        System.out.println(upTo)\n",
        "        skipping = 0\n",
        "        for i in 1..10\n",
        "            if i == 7\n",
        "                continue\n",
        "            skipping += i\n",
        "        System.out.println(skipping)\n",
    );
    let modules = compile_src(src);
    assert_eq!(run_main("break_continue", &modules, "Main"), "21\n48");
}

#[test]
fn finally_runs_when_a_catch_returns() {
    if !java_available() {
        eprintln!("skipping: java not found");
        return;
    }
    let src = concat!(
        "class Main\n",
        "    static recover():int\n",
        "        try\n",
        "            throw IllegalStateException(\"boom\")\n",
        "        catch e:IllegalStateException\n",
        "            return 1\n",
        "        finally\n",
        "            System.out.println(\"cleanup\")\n",
        "        return 2\n",
        "    static main(args:String[]):Unit\n",
        "        System.out.println(recover())\n",
    );
    let modules = compile_src(src);
    assert_eq!(run_main("finally_from_catch", &modules, "Main"), "cleanup\n1");
}

#[test]
fn destructuring_binds_or_reports_a_mismatch() {
    if !java_available() {
        eprintln!("skipping: java not found");
        return;
    }
    let src = concat!(
        "import java::util::List\n",
        "class Pair\n",
        "    static unapply(o:Object):List = o as List\n",
        "class Main\n",
        "    static main(args:String[]):Unit\n",
        "        Pair(a, b) <- [1, 2]\n",
        "        System.out.println(a)\n",
        "        System.out.println(b)\n",
        "        if Pair(x, y, z) <- [1, 2]\n",
        "            System.out.println(\"matched\")\n",
        "        else\n",
        "            System.out.println(\"no match\")\n",
    );
    let modules = compile_src(src);
    assert_eq!(run_main("destructure", &modules, "Main"), "1\n2\nno match");
}

#[test]
fn primitive_subjects_match_reference_types() {
    if !java_available() {
        eprintln!("skipping: java not found");
        return;
    }
    let src = concat!(
        "class Main\n",
        "    static main(args:String[]):Unit\n",
        "        r = 5 match\n",
        "            case s: String => \"str\"\n",
        "            case n: Number => \"num \" + n\n",
        "            case _ => \"other\"\n",
        "        System.out.println(r)\n",
        "        k = 5 match\n",
        "            case any: Object => \"obj\"\n",
        "            case _ => \"other\"\n",
        "        System.out.println(k)\n",
    );
    let modules = compile_src(src);
    assert_eq!(run_main("primitive_match", &modules, "Main"), "num 5\nobj");
}

/// Guards throw `mocha.lang.GuardViolationError`; the test supplies its own
/// definition since the runtime library is not on the class path.
const GUARD_ERROR: &str = "package mocha::lang\nclass GuardViolationError(detail:String):RuntimeException(detail)\n";

#[test]
fn guards_reject_bad_writes() {
    if !java_available() {
        eprintln!("skipping: java not found");
        return;
    }
    let src = concat!(
        "class Main\n",
        "    nonnull label:String = \"start\"\n",
        "    static main(args:String[]):Unit\n",
        "        nonnull s:String = \"a\"\n",
        "        try\n",
        "            s = null\n",
        "            System.out.println(\"reassigned\")\n",
        "        catch e:RuntimeException\n",
        "            System.out.println(e.getMessage())\n",
        "        System.out.println(s)\n",
        "        m = Main()\n",
        "        try\n",
        "            m.label = null\n",
        "        catch e:RuntimeException\n",
        "            System.out.println(e.getMessage())\n",
        "        System.out.println(m.label)\n",
    );
    let modules = compile_units(&[("guard.mo", GUARD_ERROR), ("main.mo", src)], ErrorMode::FailFast)
        .unwrap_or_else(|e| panic!("compile failed: {}", e));
    assert_eq!(
        run_main("guards", &modules, "Main"),
        "nonnull s\na\nnonnull label\nstart"
    );
}
