/*!

This is the long-form manual for `grading` and `grader`.

## Grades

Each reviewer gives every applicant a motivation grade: `-1`, `0` or `1`.
Grades are stored per reviewer: a reviewer may change their own grade at any
time, but never the grade of somebody else. Skipping an applicant only defers
them until the end of the current session.

## Disagreements

An applicant is in disagreement between two reviewers when both graded them and
the grades differ. With `grade -d`, a reviewer goes again through the applicants
on which somebody else disagrees with them, and `grade -d OTHER` restricts this
to one other reviewer. The minimal gap between two grades can be raised from 1
to 2 with `disagreement_gap` in the state file.

## Formula

The ranking score is a weighted sum of attributes:

```text
grader formula programming*0.3 + open_source*0.2 + python*0.2 + motivation*0.3
```

Attribute names are the normalized column names of the applications file
(lowercase, up to the first period, punctuation and spaces replaced by `_`).
The questions of the usual application forms get short names, for example
"Did you already apply?" becomes `applied`.

The `applied` attribute always exists: it is the number of previous
applications, 1 for a "yes" answer and 0 when the question was not asked. The
`motivation` attribute is the mean of
the grades of all the reviewers (the sum with `"aggregation": "sum"` in the
state file), and 0 for applicants nobody graded. Every
attribute used in a formula must exist, otherwise the formula is rejected and
the previous one stays in place.

Attribute values are turned into numbers as follows:

* numbers are used as they are
* categorical answers are looked up in the ratings of the field
(`grader rate programming expert 1.0`). The explanations in parentheses or
after `/` or `,` are ignored.
* anything else counts as 0 and is reported

The `formula` command shows the range of possible scores and the share of this
range that each term accounts for.

## Ranking

Applicants are sorted by decreasing score. Equal scores keep the order of the
applications file. Applicants with the `HIGHLANDER` label always come first,
and are sorted by score among themselves.

Labels may carry a bonus, defined in `label_bonuses` of the state file, for
example:

| label     | bonus |
|-----------|-------|
| CONFIRMED | 2000  |
| INVITE    | 600   |
| DECLINED  | -650  |

Use `rank --no-labels` to see the ranking without them. `autolabel N` labels
the highlanders `INVITE` and the next `N` applicants of the ranking `SHORTLIST`.

## Overrides

A reviewer may correct a self-reported field with `o FIELD VALUE` while grading.
The correction is used everywhere instead of the submitted value, which itself
is never modified.

## State file

All the reviewers' work is kept in one JSON file next to the applications. The
maps in this file are sorted, so that the work of several reviewers can be
merged with a version control system. A corrupted state file stops the
program: nothing is ever silently dropped.

*/
