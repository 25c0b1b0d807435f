//! SQL functions the generated statements call, installed by
//! `perform_initialization`.

/// Sets one key of a `jsonb` object.
pub const JSON_OBJECT_SET_KEY: &str = r#"CREATE OR REPLACE FUNCTION "json_object_set_key"(
  "json" jsonb,
  "key_to_set" TEXT,
  "value_to_set" anyelement
)
  RETURNS jsonb
  LANGUAGE sql
  IMMUTABLE
  STRICT
AS $function$
SELECT concat('{', string_agg(to_json("key") || ':' || "value", ','), '}')::jsonb
  FROM (SELECT *
          FROM jsonb_each("json")
         WHERE key <> key_to_set
         UNION ALL
        SELECT key_to_set, to_json("value_to_set")::jsonb) AS "fields"
$function$;"#;

/// Appends elements to a `jsonb` array.
pub const ARRAY_ADD: &str = r#"CREATE OR REPLACE FUNCTION "array_add"(
  "array" jsonb,
  "values" jsonb
)
  RETURNS jsonb
  LANGUAGE sql
  IMMUTABLE
  STRICT
AS $function$
  SELECT "array" || "values";
$function$;"#;

/// Appends elements not already present, keeping first occurrences in order.
pub const ARRAY_ADD_UNIQUE: &str = r#"CREATE OR REPLACE FUNCTION "array_add_unique"(
  "array" jsonb,
  "values" jsonb
)
  RETURNS jsonb
  LANGUAGE sql
  IMMUTABLE
  STRICT
AS $function$
  SELECT COALESCE(jsonb_agg("elt" ORDER BY "ord"), '[]'::jsonb)
    FROM (SELECT DISTINCT ON ("elt") "elt", "ord"
            FROM jsonb_array_elements("array" || "values") WITH ORDINALITY AS t("elt", "ord")
           ORDER BY "elt", "ord") AS "uniq";
$function$;"#;

/// Removes every occurrence of the given elements.
pub const ARRAY_REMOVE: &str = r#"CREATE OR REPLACE FUNCTION "array_remove"(
  "array" jsonb,
  "values" jsonb
)
  RETURNS jsonb
  LANGUAGE sql
  IMMUTABLE
  STRICT
AS $function$
  SELECT COALESCE(jsonb_agg("elt" ORDER BY "ord"), '[]'::jsonb)
    FROM jsonb_array_elements("array") WITH ORDINALITY AS t("elt", "ord")
   WHERE "elt" NOT IN (SELECT jsonb_array_elements("values"));
$function$;"#;

/// `true` when the array holds every one of the (non-empty) values.
pub const ARRAY_CONTAINS_ALL: &str = r#"CREATE OR REPLACE FUNCTION "array_contains_all"(
  "array" jsonb,
  "values" jsonb
)
  RETURNS boolean
  LANGUAGE sql
  IMMUTABLE
  STRICT
AS $function$
  SELECT jsonb_array_length("values") > 0
     AND NOT EXISTS (SELECT 1
                       FROM jsonb_array_elements("values") AS "wanted"
                      WHERE "wanted" NOT IN (SELECT jsonb_array_elements("array")));
$function$;"#;

/// `true` when every `LIKE` pattern matches at least one array element.
pub const ARRAY_CONTAINS_ALL_REGEX: &str = r#"CREATE OR REPLACE FUNCTION "array_contains_all_regex"(
  "array" jsonb,
  "values" jsonb
)
  RETURNS boolean
  LANGUAGE sql
  IMMUTABLE
  STRICT
AS $function$
  SELECT jsonb_array_length("values") > 0
     AND NOT EXISTS (SELECT 1
                       FROM jsonb_array_elements_text("values") AS "pattern"
                      WHERE NOT EXISTS (SELECT 1
                                          FROM jsonb_array_elements_text("array") AS "elt"
                                         WHERE "elt" LIKE "pattern"));
$function$;"#;

/// `true` when the array holds at least one of the values.
pub const ARRAY_CONTAINS: &str = r#"CREATE OR REPLACE FUNCTION "array_contains"(
  "array" jsonb,
  "values" jsonb
)
  RETURNS boolean
  LANGUAGE sql
  IMMUTABLE
  STRICT
AS $function$
  SELECT EXISTS (SELECT 1
                   FROM jsonb_array_elements("array") AS "elt"
                  WHERE "elt" IN (SELECT jsonb_array_elements("values")));
$function$;"#;

/// Every helper, in installation order.
pub const ALL: &[&str] = &[
    JSON_OBJECT_SET_KEY,
    ARRAY_ADD,
    ARRAY_ADD_UNIQUE,
    ARRAY_REMOVE,
    ARRAY_CONTAINS_ALL,
    ARRAY_CONTAINS_ALL_REGEX,
    ARRAY_CONTAINS,
];
