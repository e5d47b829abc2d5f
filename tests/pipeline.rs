//! End-to-end scenarios over the public `compile` API.

use indoc::indoc;
use lunic::{compile, CompileConfig, CompileOutput, DiagnosticKind};
use pretty_assertions::assert_eq;

fn run(source: &str) -> CompileOutput {
    compile(source, &[], &CompileConfig::default())
}

fn error_messages(output: &CompileOutput) -> Vec<String> {
    output.errors.iter().map(|e| e.message.clone()).collect()
}

#[test]
fn literal_types_reject_unlisted_values() {
    let output = run(indoc! {r#"
        type Status = "loading" | "success" | "error"
        local s: Status = "loading"
        local bad: Status = "invalid"
    "#});
    assert_eq!(
        error_messages(&output),
        [r#"Cannot assign type '"invalid"' to variable of type '"loading" | "success" | "error"'"#]
    );
    assert_eq!(output.errors[0].kind, DiagnosticKind::Type);
    assert_eq!(output.errors[0].line, 3);
    // The alias vanishes; both locals remain for debugging.
    assert_eq!(
        output.code,
        "local s = \"loading\"\n\nlocal bad = \"invalid\"\n"
    );
}

#[test]
fn class_with_constructor_and_method() {
    let output = run(indoc! {r#"
        class Point
            x: number
            y: number
            constructor(a: number, b: number)
                self.x = a
                self.y = b
            end
            sum(): number
                return self.x + self.y
            end
        end
        local p: Point = Point(3, 4)
    "#});
    assert_eq!(error_messages(&output), Vec::<String>::new());
    assert!(output.code.contains("local Point = {}"));
    assert!(output.code.contains("Point.__index = Point"));
    assert!(output.code.contains("function Point.new(a, b)"));
    assert!(output.code.contains("local self = setmetatable({}, Point)"));
    assert!(output.code.contains("    return self\nend"));
    assert!(output.code.contains("function Point:sum()"));
    assert!(output.code.contains("local p = Point.new(3, 4)"));
}

#[test]
fn override_cannot_narrow_visibility() {
    let output = run(indoc! {r#"
        class A
            public m(): void
            end
        end
        class B extends A
            private m(): void
            end
        end
    "#});
    assert_eq!(
        error_messages(&output),
        ["Method 'm' override cannot reduce visibility from public to private"]
    );
}

#[test]
fn generic_type_alias_instantiation() {
    let output = run(indoc! {r#"
        type Nullable<T> = nil | T
        local a: Nullable<number> = 5
        local b: Nullable<number> = nil
        local c: Nullable<number> = "x"
    "#});
    assert_eq!(
        error_messages(&output),
        [r#"Cannot assign type '"x"' to variable of type 'nil | number'"#]
    );
    assert_eq!(output.errors[0].line, 4);
}

#[test]
fn table_literals_satisfy_object_shapes_structurally() {
    let output = run(indoc! {r#"
        type Point
            x: number
            y: number
        end
        local p: Point = { x = 10, y = 20 }
        local q: Point = { x = 10 }
    "#});
    assert_eq!(
        error_messages(&output),
        ["Cannot assign type '<table literal>' to variable of type 'Point'"]
    );
    assert_eq!(output.errors[0].line, 6);
}

#[test]
fn source_map_emission() {
    let config = CompileConfig {
        source_map: true,
        ..CompileConfig::default()
    };
    let output = compile("local x = 1\nlocal y = 2", &[], &config);
    assert_eq!(error_messages(&output), Vec::<String>::new());

    let map = output.source_map.as_ref().expect("source map requested");
    assert_eq!(map.version, 3);
    assert_eq!(map.sources, ["main.lunic"]);
    assert_eq!(map.file, "main.lua");
    // First segment starts at generated column 0 of line 1, source (1, 0).
    assert!(map.mappings.starts_with("AAAA"));
    assert!(output
        .code
        .ends_with("--# sourceMappingURL=main.lua.map\n"));

    let json = map.to_json();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["version"], 3);
}

#[test]
fn declarations_feed_the_checker() {
    let declarations = indoc! {r#"
        declare function print(message: string): void
        declare const VERSION: string
    "#};
    let output = compile(
        "print(VERSION)\nprint(1)",
        &[declarations],
        &CompileConfig::default(),
    );
    assert_eq!(
        error_messages(&output),
        ["Argument 1: cannot pass type '1' to parameter of type 'string'"]
    );
    // Declarations never reach the generated output.
    assert_eq!(output.code, "print(VERSION)\n\nprint(1)\n");
}

#[test]
fn optimizer_is_opt_in() {
    let source = "local x = 2 + 3\nif false then\n    local dead = 1\nend";
    let plain = run(source);
    assert!(plain.code.contains("2 + 3"));
    assert!(plain.code.contains("if false then"));

    let config = CompileConfig {
        optimize: true,
        ..CompileConfig::default()
    };
    let optimized = compile(source, &[], &config);
    assert_eq!(optimized.code, "local x = 5\n");
}

#[test]
fn type_checking_can_be_disabled() {
    let config = CompileConfig {
        type_check: false,
        ..CompileConfig::default()
    };
    let output = compile("local s: number = \"oops\"", &[], &config);
    assert_eq!(error_messages(&output), Vec::<String>::new());
    assert_eq!(output.code, "local s = \"oops\"\n");
}

#[test]
fn diagnostics_carry_kind_and_position() {
    let output = run("local x = @\nlocal y = then\nlocal z: number = \"s\"");
    let kinds: Vec<_> = output.errors.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        [DiagnosticKind::Lex, DiagnosticKind::Parse, DiagnosticKind::Type]
    );
    assert!(output.errors.iter().all(|e| e.file == "main.lunic"));
    assert_eq!(output.errors[0].line, 1);
    assert_eq!(output.errors[1].line, 2);
    assert_eq!(output.errors[2].line, 3);
}

#[test]
fn compilation_is_deterministic() {
    let source = indoc! {r#"
        enum Color
            Red = 1
            Green
        end
        class Shape
            area: number
            constructor(area: number)
                self.area = area
            end
            describe(): string
                return "shape of " .. "size"
            end
        end
        local s: Shape = Shape(12)
        local c: Color = Color.Green
    "#};
    let config = CompileConfig {
        source_map: true,
        optimize: true,
        ..CompileConfig::default()
    };
    let first = compile(source, &[], &config);
    let second = compile(source, &[], &config);
    assert_eq!(first.code, second.code);
    assert_eq!(
        first.source_map.as_ref().map(|m| m.to_json()),
        second.source_map.as_ref().map(|m| m.to_json())
    );
    assert_eq!(first.errors, second.errors);
}

#[test]
fn whole_program_smoke() {
    let output = run(indoc! {r#"
        import { shuffle } from "lib/random"

        enum Suit
            Clubs
            Diamonds
            Hearts
            Spades
        end

        interface Describable
            describe(): string
        end

        class Card implements Describable
            suit: Suit
            rank: number
            constructor(suit: Suit, rank: number)
                self.suit = suit
                self.rank = rank
            end
            describe(): string
                return "card " .. "of rank"
            end
        end

        class Deck
            cards: table<number, Card>
            count: number
            constructor()
                self.count = 0
            end
            size(): number
                return self.count
            end
        end

        function build(): Deck
            local deck: Deck = Deck()
            for rank = 1, 13 do
                local card: Card = Card(Suit.Clubs, rank)
            end
            return deck
        end

        local deck: Deck = build()
        shuffle(deck)
    "#});
    assert_eq!(error_messages(&output), Vec::<String>::new());
    assert!(output.code.contains("local _lib_random = require(\"lib/random\")"));
    assert!(output.code.contains("Clubs = 0"));
    assert!(output.code.contains("Spades = 3"));
    assert!(output.code.contains("function Card.new(suit, rank)"));
    assert!(output.code.contains("function Deck:size()"));
    assert!(output.code.contains("local card = Card.new(Suit.Clubs, rank)"));
    // Interfaces leave no trace in the output.
    assert!(!output.code.contains("Describable"));
}
