//! Interpreter semantics as a snippet author sees them: console output and uncaught errors.

mod common;

use common::{failure, output};

#[test]
fn console_log_formats_like_node() {
    let out = output(
        "console.log('text', 42, true, null, undefined);
         console.log([1, 'two', [3]]);
         console.log({ a: 1, 'b-c': 'x', nested: { deep: [] } });
         console.log('%s has %d items', 'cart', 3);",
    );
    assert_eq!(
        out,
        vec![
            "text 42 true null undefined",
            "[ 1, 'two', [ 3 ] ]",
            "{ a: 1, 'b-c': 'x', nested: { deep: [] } }",
            "cart has 3 items",
        ]
    );
}

#[test]
fn numbers_print_like_javascript() {
    let out = output("console.log(0.1 + 0.2, 1 / 3, 1e21, -0, 10 / 0, 0 / 0, (1234.5678).toFixed(2));");
    assert_eq!(out, vec!["0.30000000000000004 0.3333333333333333 1e+21 -0 Infinity NaN 1234.57"]);
}

#[test]
fn template_literals_and_string_methods() {
    let out = output(
        "const name = 'world';
         console.log(`hello ${name.toUpperCase()}!`);
         console.log('a,b,c'.split(',').reverse().join('-'));
         console.log('  pad '.trim().padStart(5, '*'));",
    );
    assert_eq!(out, vec!["hello WORLD!", "c-b-a", "**pad"]);
}

#[test]
fn array_methods_chain() {
    let out = output(
        "const xs = [5, 1, 4, 2, 3];
         console.log(xs.filter(x => x % 2).map(x => x * 10));
         console.log(xs.reduce((a, b) => a + b, 0));
         console.log([...xs].sort((a, b) => a - b), xs.includes(4), xs.indexOf(9));",
    );
    assert_eq!(out, vec!["[ 50, 10, 30 ]", "15", "[ 1, 2, 3, 4, 5 ] true -1"]);
}

#[test]
fn maps_and_sets_keep_insertion_order() {
    let out = output(
        "const m = new Map([['a', 1]]);
         m.set('b', 2).set('a', 3);
         console.log(m, m.size, m.get('a'));
         const s = new Set([3, 1, 3, 2]);
         console.log(s, s.has(2));",
    );
    assert_eq!(out, vec!["Map(2) { 'a' => 3, 'b' => 2 } 2 3", "Set(3) { 3, 1, 2 } true"]);
}

#[test]
fn microtasks_run_before_timers() {
    let out = output(
        "console.log('sync');
         setTimeout(() => console.log('timeout'), 0);
         Promise.resolve().then(() => console.log('micro 1')).then(() => console.log('micro 2'));
         queueMicrotask(() => console.log('queued'));
         console.log('end');",
    );
    assert_eq!(out, vec!["sync", "end", "micro 1", "queued", "micro 2", "timeout"]);
}

#[test]
fn timers_fire_in_delay_order_on_a_virtual_clock() {
    let out = output(
        "setTimeout(() => console.log('later'), 1000);
         setTimeout(() => console.log('sooner'), 10);
         const id = setTimeout(() => console.log('never'), 5);
         clearTimeout(id);
         let n = 0;
         const tick = setInterval(() => { n++; if (n === 3) { clearInterval(tick); console.log('ticks', n); } }, 100);",
    );
    assert_eq!(out, vec!["sooner", "ticks 3", "later"]);
}

#[test]
fn promise_combinators() {
    let out = output(
        "Promise.all([1, Promise.resolve(2), new Promise(r => setTimeout(() => r(3), 10))])
           .then(values => console.log('all', values));
         Promise.allSettled([Promise.reject(new Error('no')), 1])
           .then(results => console.log(results.map(r => r.status).join()));
         Promise.race([new Promise(r => setTimeout(() => r('slow'), 50)), new Promise(r => setTimeout(() => r('fast'), 5))])
           .then(v => console.log('race', v));
         Promise.any([Promise.reject(1), Promise.reject(2)])
           .catch(e => console.log(e.name, e.errors));",
    );
    assert_eq!(
        out,
        vec!["rejected,fulfilled", "AggregateError [ 1, 2 ]", "race fast", "all [ 1, 2, 3 ]"]
    );
}

#[test]
fn finally_passes_values_through() {
    let out = output(
        "Promise.resolve(7)
           .finally(() => console.log('cleanup'))
           .then(v => console.log('value', v));
         Promise.reject(new Error('bad'))
           .finally(() => {})
           .catch(e => console.log('caught', e.message));",
    );
    assert_eq!(out, vec!["cleanup", "value 7", "caught bad"]);
}

#[test]
fn json_round_trips_and_reports_cycles() {
    let out = output(
        "const data = { name: 'Ada', tags: ['math'], skip: undefined };
         const text = JSON.stringify(data);
         console.log(text);
         console.log(JSON.parse(text).tags[0]);
         console.log(JSON.stringify({ a: [1, 2] }, null, 2));
         const loop = {}; loop.self = loop;
         try { JSON.stringify(loop); } catch (e) { console.log(e.name); }",
    );
    assert_eq!(
        out,
        vec![
            r#"{"name":"Ada","tags":["math"]}"#,
            "math",
            "{",
            "  \"a\": [",
            "    1,",
            "    2",
            "  ]",
            "}",
            "TypeError",
        ]
    );
}

#[test]
fn json_parse_errors_use_node_wording() {
    let message = failure("JSON.parse('{bad');");
    assert!(message.starts_with("SyntaxError: "), "{}", message);
}

#[test]
fn math_random_is_deterministic() {
    let first = output("console.log(Math.random(), Math.random())");
    let second = output("console.log(Math.random(), Math.random())");
    assert_eq!(first, second);
}

#[test]
fn console_group_indents_nested_output() {
    let out = output(
        "console.group('outer');
         console.log('one');
         console.group();
         console.warn('two');
         console.groupEnd();
         console.groupEnd();
         console.error('three');",
    );
    assert_eq!(out, vec!["outer", "  one", "    two", "three"]);
}

#[test]
fn errors_carry_names_messages_and_causes() {
    let out = output(
        "try { null.prop; } catch (e) { console.log(e instanceof TypeError, e.message); }
         try { undefinedName; } catch (e) { console.log(e.name, e.message); }
         const wrapped = new Error('outer', { cause: 'inner' });
         console.log(wrapped.cause, String(new RangeError('r')));",
    );
    assert_eq!(
        out,
        vec![
            "true Cannot read properties of null (reading 'prop')",
            "ReferenceError undefinedName is not defined",
            "inner RangeError: r",
        ]
    );
}

#[test]
fn uncaught_errors_end_the_run() {
    assert_eq!(failure("throw new TypeError('nope')"), "TypeError: nope");
    assert_eq!(
        failure("setTimeout(() => { throw new Error('in timer'); }, 0)"),
        "Error: in timer"
    );
    assert_eq!(failure("let a = ;").split(':').next(), Some("SyntaxError"));
}

#[test]
fn getters_spread_and_computed_keys() {
    let out = output(
        "const key = 'dyn';
         const base = { a: 1, [key + 'amic']: 2 };
         const merged = { ...base, b: 3 };
         console.log(merged, Object.keys(merged).length);
         const [x, ...rest] = [1, 2, 3];
         console.log(Math.max(...rest), x);",
    );
    assert_eq!(out, vec!["{ a: 1, dynamic: 2, b: 3 } 3", "3 1"]);
}

#[test]
fn loops_and_control_flow() {
    let out = output(
        "let total = 0;
         for (const n of [1, 2, 3, 4]) { if (n === 2) continue; if (n === 4) break; total += n; }
         const keys = [];
         for (const k in { x: 1, y: 2 }) keys.push(k);
         let i = 0;
         do { i++; } while (i < 5);
         console.log(total, keys.join(''), i);",
    );
    assert_eq!(out, vec!["4 xy 5"]);
}

#[test]
fn with_statements_fail_before_anything_runs() {
    let (lines, result) = common::run("console.log('before'); with ({ a: 1 }) { console.log(a); }");
    assert!(lines.is_empty());
    assert!(result.unwrap_err().to_string().starts_with("SyntaxError"));
}

#[test]
fn for_in_sees_enumerable_keys_along_the_prototype_chain() {
    let out = output(
        "class Point { constructor(x) { this.x = x; } norm() { return this.x; } }
         const keys = [];
         for (const k in new Point(3)) keys.push(k);
         console.log(keys.join());
         const child = Object.create({ inherited: 1 });
         child.own = 2;
         const seen = [];
         for (const k in child) seen.push(k);
         console.log(seen.join(), Object.keys(child).join());
         const o = {};
         Object.defineProperty(o, 'hidden', { value: 1 });
         Object.defineProperty(o, 'shown', { value: 2, enumerable: true });
         console.log(Object.keys(o).join(), JSON.stringify(o), o.hidden);
         function f() {}
         console.log(Object.keys(f).length, Object.keys(Point.prototype).length);",
    );
    assert_eq!(out, vec!["x", "own,inherited own", "shown {\"shown\":2} 1", "0 0"]);
}

#[test]
fn strings_are_measured_in_utf16_units() {
    let out = output(
        "const s = 'a😀';
         console.log(s.length, s.charCodeAt(1), s.codePointAt(1), [...s].length, s.indexOf('😀'));",
    );
    assert_eq!(out, vec!["3 55357 128512 2 1"]);
}

#[test]
fn plain_calls_leave_this_undefined() {
    let out = output(
        "function who() { return typeof this; }
         const obj = { who };
         console.log(who(), obj.who());",
    );
    assert_eq!(out, vec!["undefined object"]);
}

#[test]
fn sparse_arrays_keep_their_holes() {
    let out = output(
        "console.log(new Array(5));
         const a = [1, 2, 3];
         delete a[1];
         console.log(a, 1 in a, a.hasOwnProperty(0));
         const b = [];
         b[3] = 'x';
         console.log(b);
         let calls = 0;
         new Array(3).forEach(() => calls++);
         console.log(calls, new Array(3).fill(0));",
    );
    assert_eq!(
        out,
        vec![
            "[ <5 empty items> ]",
            "[ 1, <1 empty item>, 3 ] false true",
            "[ <3 empty items>, 'x' ]",
            "0 [ 0, 0, 0 ]",
        ]
    );
}

#[test]
fn promise_any_rejects_with_an_aggregate_error() {
    let out = output(
        "Promise.any([Promise.reject(1)]).catch(e => {
           console.log(e.constructor.name, e instanceof AggregateError, e instanceof Error, e.message);
         });
         const direct = new AggregateError(['a', 'b'], 'several');
         console.log(direct.name, direct.message, direct.errors);",
    );
    assert_eq!(
        out,
        vec![
            "AggregateError several [ 'a', 'b' ]",
            "AggregateError true true All promises were rejected",
        ]
    );
}
