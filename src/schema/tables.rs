use super::{Column, ColumnType::*, OwnerType, Relation, RelationKind, Table};

pub static ROLES: Table = Table {
    name: "roles",
    model: "Role",
    columns: &[
        Column::new("code", Text),
        Column::new("name", Text).nullable(),
    ],
    fillable: &["code", "name"],
    soft_deletes: false,
    relations: &[Relation {
        name: "users",
        kind: RelationKind::HasMany { target: "users", foreign_key: "role_id" },
    }],
};

pub static USERS: Table = Table {
    name: "users",
    model: "User",
    columns: &[
        Column::new("phone", Text),
        Column::new("sns_id", Text).nullable(),
        Column::new("sns_driver", Text).nullable(),
        Column::new("name", Text).nullable(),
        Column::new("role_id", BigInt).nullable(),
        Column::new("password", Text).nullable(),
    ],
    fillable: &["phone", "sns_id", "sns_driver", "name", "role_id", "password"],
    soft_deletes: true,
    relations: &[
        Relation {
            name: "role",
            kind: RelationKind::BelongsTo { target: "roles", foreign_key: "role_id" },
        },
        Relation {
            name: "shop",
            kind: RelationKind::HasOne { target: "shop", foreign_key: "user_id" },
        },
        Relation {
            name: "news",
            kind: RelationKind::HasMany { target: "news", foreign_key: "created_by" },
        },
    ],
};

pub static SHOP: Table = Table {
    name: "shop",
    model: "Shop",
    columns: &[
        Column::new("user_id", BigInt),
        Column::new("name", Text).nullable(),
        Column::new("address", Text).nullable(),
        Column::new("phone", Text).nullable(),
        Column::new("geo", Text).nullable(),
        Column::new("description", Text).nullable(),
    ],
    fillable: &["user_id", "name", "address", "phone", "geo", "description"],
    soft_deletes: true,
    relations: &[
        Relation {
            name: "user",
            kind: RelationKind::BelongsTo { target: "users", foreign_key: "user_id" },
        },
        Relation {
            name: "files",
            kind: RelationKind::MorphMany { target: "files", morph: "fileable", owner: OwnerType::Shop },
        },
    ],
};

pub static NEWS: Table = Table {
    name: "news",
    model: "News",
    columns: &[
        Column::new("title", Text).nullable(),
        Column::new("description", Text).nullable(),
        Column::new("content", Text).nullable(),
        Column::new("created_by", BigInt),
        Column::new("status", Text).nullable(),
        Column::new("is_published", Bool).default_to("false"),
    ],
    fillable: &["title", "description", "content", "created_by", "status", "is_published"],
    soft_deletes: false,
    relations: &[
        Relation {
            name: "creator",
            kind: RelationKind::BelongsTo { target: "users", foreign_key: "created_by" },
        },
        Relation {
            name: "files",
            kind: RelationKind::MorphMany { target: "files", morph: "fileable", owner: OwnerType::News },
        },
    ],
};

pub static FILES: Table = Table {
    name: "files",
    model: "File",
    columns: &[
        Column::new("url", Text).nullable(),
        Column::new("thumb", Text).nullable(),
        Column::new("type", Text).default_to("image"),
        Column::new("fileable_id", BigInt).nullable(),
        Column::new("fileable_type", Text).nullable(),
    ],
    fillable: &["url", "thumb", "type", "fileable_id", "fileable_type"],
    soft_deletes: false,
    relations: &[Relation {
        name: "fileable",
        kind: RelationKind::MorphTo { morph: "fileable" },
    }],
};

pub static PERSONAL_ACCESS_TOKENS: Table = Table {
    name: "personal_access_tokens",
    model: "PersonalAccessToken",
    columns: &[
        Column::new("user_id", BigInt),
        Column::new("name", Text),
        Column::new("token", Text),
        Column::new("last_used_at", Timestamp).nullable(),
    ],
    fillable: &["user_id", "name", "token", "last_used_at"],
    soft_deletes: false,
    relations: &[Relation {
        name: "user",
        kind: RelationKind::BelongsTo { target: "users", foreign_key: "user_id" },
    }],
};

/// All tables, in dependency order for DDL.
pub static TABLES: &[&Table] = &[&ROLES, &USERS, &SHOP, &NEWS, &FILES, &PERSONAL_ACCESS_TOKENS];

pub fn table(name: &str) -> Option<&'static Table> {
    TABLES.iter().copied().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_relation_target_exists() {
        for t in TABLES {
            for r in t.relations {
                if !matches!(r.kind, RelationKind::MorphTo { .. }) {
                    assert!(r.target().is_some(), "{}.{} has no target", t.name, r.name);
                }
            }
        }
    }

    #[test]
    fn fillable_columns_are_declared() {
        for t in TABLES {
            for f in t.fillable {
                assert!(t.column(f).is_some(), "{}.{} is fillable but undeclared", t.name, f);
            }
        }
    }
}
