/*!

This is the long-form manual for `allocation_table` and `allocpivot`.

## Input tables

The source table is a header row followed by one row per person. Columns
that repeat share a common prefix and may each be followed by a percentage
column named after them with a trailing ` %`:

```text
User,Role,Project Allocation 1,Project Allocation 1 %,Project Allocation 2,Project Allocation 2 %
jvonk,Student,Java,80%,Rust,
mdoe,Teacher,Rust,,Go,
```

Requesting the columns `Project Allocation*`, `User` and `Role` produces:

```text
Project Allocation%,Project Allocation,User,Role
0.8,Java,jvonk,Student
0.2,Rust,jvonk,Student
0.5,Rust,mdoe,Teacher
0.5,Go,mdoe,Teacher
```

The rules for the ratio of a repeated column, for each row:
 - a filled percentage column is used as it is. Accepted forms are numbers
   (`0.8`) and percentages (`80%`).
 - what is left of 100% is split in equal parts among the other columns that
   hold a value. Without any percentage, all the filled columns get the same
   share.
 - percentages adding up to more than 100% stop the run, and nothing is
   written.

Rows where any output cell would be empty are skipped: in the example above,
a third project column left empty produces no row.

### Themes

A theme table maps projects to broader themes. Its first two rows are
headers, the first column is the project and the second the theme:

|               |           |
|---------------|-----------|
| Themes        |           |
| Project       | Theme     |
| Java          | Languages |
| Rust          | Languages |

When provided, the theme of the project (the first requested column) is
added in front of every row. Projects without a theme are reported and their
rows skipped.

## Cross-tab views

With three requested columns or more, a view is maintained over the
normalized table. The first ratio is summed, the last column spreads
horizontally and all the other columns group the rows. When the view already
exists, only its source range is updated: any other change made to it is
kept.

## Configuration

`allocpivot` reads a JSON configuration:

```json
{
  "columnSpecs": ["Project Allocation*", "User", "Role"],
  "sourceTableName": "Allocations",
  "outputViewName": "Summary",
  "themeTableName": "Themes",
  "dataSource": { "provider": "csv", "filePath": "tables" },
  "outputDirectory": "out"
}
```

 - `columnSpecs` (array of strings, required): the requested columns. A
   trailing `*` requests every column starting with the label.
 - `sourceTableName`, `outputViewName` (string, required).
 - `themeTableName` (string, optional).
 - `dataSource.provider`: `csv` (a directory of `<table>.csv` files) or
   `xlsx` (an Excel workbook, one worksheet per table).
 - `outputDirectory` (string, optional): where `<view>-raw.csv` and
   `<view>.view.json` are written. Defaults to the data directory.

Relative paths are resolved from the directory of the configuration file.
Every option can also be given on the command line.

 */
