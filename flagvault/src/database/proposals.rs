//! SQL operations for proposals.
//!
//! Status transitions are guarded with `WHERE status = 'pending'` so that a
//! proposal can leave the pending state at most once.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{Proposal, ProposalStatus, ProposalTarget, RejectionReason};

use super::codec::{column_json, column_parse, from_millis, to_json, to_millis};
use super::connection::Database;

const SELECT_PROPOSAL_COLUMNS: &str = r"
    SELECT id, config_id, variant_id, base_version, base, diff, proposer_email, message,
           status, created_at, approved_at, rejected_at, reviewer_email, rejection_reason,
           rejected_in_favor_of
    FROM proposals
";

fn row_to_proposal(row: &Row<'_>) -> rusqlite::Result<Proposal> {
    let variant_id: Option<String> = row.get(2)?;
    let base: String = row.get(4)?;
    let diff: String = row.get(5)?;
    let status: String = row.get(8)?;
    let reason: Option<String> = row.get(13)?;
    Ok(Proposal {
        id: row.get(0)?,
        config_id: row.get(1)?,
        target: match variant_id {
            Some(variant_id) => ProposalTarget::Variant { variant_id },
            None => ProposalTarget::Config,
        },
        base_version: row.get(3)?,
        base: column_json(&base)?,
        diff: column_json(&diff)?,
        proposer_email: row.get(6)?,
        message: row.get(7)?,
        status: column_parse(&status, ProposalStatus::parse)?,
        created_at: from_millis(row.get(9)?),
        approved_at: row.get::<_, Option<i64>>(10)?.map(from_millis),
        rejected_at: row.get::<_, Option<i64>>(11)?.map(from_millis),
        reviewer_email: row.get(12)?,
        rejection_reason: reason
            .as_deref()
            .map(|r| column_parse(r, RejectionReason::parse))
            .transpose()?,
        rejected_in_favor_of_proposal_id: row.get(14)?,
    })
}

/// Which pending proposals a bulk rejection applies to.
#[derive(Debug, Clone, Copy)]
pub enum PendingScope<'a> {
    /// Every pending proposal of a config, variant-level included.
    WholeConfig(&'a str),
    /// Pending config-level proposals of a config.
    ConfigLevel(&'a str),
    /// Pending proposals on one variant.
    Variant(&'a str),
}

impl<'a> PendingScope<'a> {
    fn clause(self) -> (&'static str, &'a str) {
        match self {
            Self::WholeConfig(id) => ("config_id = ?1", id),
            Self::ConfigLevel(id) => ("config_id = ?1 AND variant_id IS NULL", id),
            Self::Variant(id) => ("variant_id = ?1", id),
        }
    }
}

impl Database {
    /// Inserts a proposal row.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the insert fails.
    pub fn insert_proposal(conn: &Connection, project_id: &str, proposal: &Proposal) -> Result<()> {
        conn.execute(
            r"INSERT INTO proposals
              (id, project_id, config_id, variant_id, base_version, base, diff, proposer_email,
               message, status, created_at, approved_at, rejected_at, reviewer_email,
               rejection_reason, rejected_in_favor_of)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                proposal.id,
                project_id,
                proposal.config_id,
                proposal.target.variant_id(),
                proposal.base_version,
                to_json(&proposal.base)?,
                to_json(&proposal.diff)?,
                proposal.proposer_email,
                proposal.message,
                proposal.status.as_str(),
                to_millis(proposal.created_at),
                proposal.approved_at.map(to_millis),
                proposal.rejected_at.map(to_millis),
                proposal.reviewer_email,
                proposal.rejection_reason.map(RejectionReason::as_str),
                proposal.rejected_in_favor_of_proposal_id,
            ],
        )?;
        Ok(())
    }

    /// Retrieves a proposal by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored document is corrupt.
    pub fn get_proposal(conn: &Connection, id: &str) -> Result<Option<Proposal>> {
        Ok(conn
            .query_row(
                &format!("{SELECT_PROPOSAL_COLUMNS} WHERE id = ?"),
                [id],
                row_to_proposal,
            )
            .optional()?)
    }

    /// Returns the project a proposal belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_proposal_project_id(conn: &Connection, id: &str) -> Result<Option<String>> {
        Ok(conn
            .query_row("SELECT project_id FROM proposals WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Lists a config's proposals, newest first, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_proposals(
        conn: &Connection,
        config_id: &str,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<Proposal>> {
        let mut stmt = conn.prepare(&format!(
            r"{SELECT_PROPOSAL_COLUMNS}
              WHERE config_id = ?1 AND (?2 IS NULL OR status = ?2)
              ORDER BY created_at DESC, rowid DESC"
        ))?;
        let proposals = stmt
            .query_map(
                params![config_id, status.map(ProposalStatus::as_str)],
                row_to_proposal,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(proposals)
    }

    /// Marks a pending proposal approved. Returns false if it was no longer
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_proposal_approved(
        conn: &Connection,
        id: &str,
        reviewer_email: &str,
        at: i64,
    ) -> Result<bool> {
        let rows = conn.execute(
            r"UPDATE proposals
              SET status = 'approved', approved_at = ?, reviewer_email = ?
              WHERE id = ? AND status = 'pending'",
            params![at, reviewer_email, id],
        )?;
        Ok(rows > 0)
    }

    /// Marks a pending proposal rejected. Returns false if it was no longer
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_proposal_rejected(
        conn: &Connection,
        id: &str,
        reviewer_email: &str,
        reason: RejectionReason,
        in_favor_of: Option<&str>,
        at: i64,
    ) -> Result<bool> {
        let rows = conn.execute(
            r"UPDATE proposals
              SET status = 'rejected', rejected_at = ?, reviewer_email = ?,
                  rejection_reason = ?, rejected_in_favor_of = ?
              WHERE id = ? AND status = 'pending'",
            params![at, reviewer_email, reason.as_str(), in_favor_of, id],
        )?;
        Ok(rows > 0)
    }

    /// Rejects every pending proposal in `scope` except `except`, returning
    /// the ids that were rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub fn reject_pending_proposals(
        conn: &Connection,
        scope: PendingScope<'_>,
        except: Option<&str>,
        reviewer_email: &str,
        reason: RejectionReason,
        in_favor_of: Option<&str>,
        at: i64,
    ) -> Result<Vec<String>> {
        let (clause, scope_id) = scope.clause();
        let mut stmt = conn.prepare(&format!(
            r"SELECT id FROM proposals
              WHERE {clause} AND status = 'pending' AND (?2 IS NULL OR id != ?2)
              ORDER BY created_at, rowid"
        ))?;
        let ids = stmt
            .query_map(params![scope_id, except], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        for id in &ids {
            Self::mark_proposal_rejected(conn, id, reviewer_email, reason, in_favor_of, at)?;
        }
        Ok(ids)
    }
}
