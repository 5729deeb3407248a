use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cmis_client::cmis_core::{
    Ace, AclPropagation, CmisObject, ContentStream, NavigationOption, ObjectId, ObjectRef,
    UnfileObject, VersioningState,
};
use cmis_client::{CmisClient, Navigation, NewDocument, Pager};
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::Command;

/// Resolve a command-line target: `/a/b` is a path, anything else an id.
async fn target(client: &CmisClient, value: &str) -> Result<ObjectRef> {
    if value.starts_with('/') {
        let object = client.get_object_by_path(value, None).await?;
        Ok(ObjectRef::ByValue(object))
    } else {
        Ok(ObjectRef::ById(ObjectId::from(value)))
    }
}

async fn target_id(client: &CmisClient, value: &str) -> Result<ObjectId> {
    Ok(target(client, value).await?.id().clone())
}

fn properties(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().collect()
}

/// Group `<principal>=<permission>` pairs into one entry per principal.
fn aces(pairs: Vec<(String, String)>) -> Vec<Ace> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (principal, permission) in pairs {
        grouped.entry(principal).or_default().push(permission);
    }
    grouped
        .into_iter()
        .map(|(principal, permissions)| Ace::new(principal, permissions))
        .collect()
}

async fn read_upload(file: &Path, name: Option<String>, mime_type: String) -> Result<ContentStream> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", file.display()))?,
    };
    Ok(ContentStream::from_bytes(name, mime_type, data))
}

async fn take<T: Send + 'static>(mut pager: Pager<T>, limit: Option<usize>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    while limit.is_none_or(|l| items.len() < l) {
        match pager.next().await? {
            Some(item) => items.push(item),
            None => break,
        }
    }
    Ok(items)
}

fn print(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_object(object: &Arc<CmisObject>) -> Result<()> {
    print(object.as_ref())
}

/// Run one subcommand against a connected client.
pub async fn run(client: &CmisClient, command: Command) -> Result<()> {
    debug!("Running {:?}", command);
    match command {
        Command::Repositories => print(&client.repositories().await?),
        Command::Info => print(&client.repository_info().await?),
        Command::Type { type_id } => print(client.get_type_definition(&type_id).await?.as_ref()),
        Command::Get { target: t, filter } => {
            let object = if t.starts_with('/') {
                client.get_object_by_path(&t, filter.as_deref()).await?
            } else {
                client.get_object_by_id(&ObjectId::from(t.as_str()), filter.as_deref()).await?
            };
            print_object(&object)
        }
        Command::Mkdir { path } => print_object(&client.get_or_create_folder_by_path(&path).await?),
        Command::Put {
            folder,
            file,
            name,
            mime_type,
            object_type,
            force,
            versioning_state,
            properties: extra,
        } => {
            let content = read_upload(&file, name, mime_type).await?;
            let mut document = NewDocument::new(content.filename().unwrap_or_default())
                .with_type(object_type)
                .with_versioning_state(VersioningState::parse(&versioning_state)?);
            for (key, value) in extra {
                document = document.with_property(key, value);
            }
            let document = document.with_content(content);
            print_object(&client.create_document_by_path(&folder, document, force).await?)
        }
        Command::Cat { target: t, output } => {
            let document = target(client, &t).await?;
            let content = client.get_content_stream(&document).await?;
            let data = content.into_bytes().await?;
            match output {
                Some(path) => tokio::fs::write(&path, &data)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
            }
            Ok(())
        }
        Command::Update { target: t, properties: pairs } => {
            let object = target(client, &t).await?;
            let id = client.update_object_properties(&object, &properties(pairs)).await?;
            print(&json!({ "objectId": id }))
        }
        Command::Aspect {
            target: t,
            aspect_id,
            properties: pairs,
        } => {
            let object = target(client, &t).await?;
            let id = client.apply_aspect(&object, &aspect_id, &properties(pairs)).await?;
            print(&json!({ "objectId": id }))
        }
        Command::Mv {
            target: t,
            source_folder,
            target_folder,
        } => {
            let object = target(client, &t).await?;
            let source = target_id(client, &source_folder).await?;
            let destination = target_id(client, &target_folder).await?;
            let id = client.move_object(&object, &source, &destination).await?;
            print(&json!({ "objectId": id }))
        }
        Command::Rm {
            target: t,
            tree,
            all_versions,
            unfile,
            continue_on_failure,
        } => {
            let object = target(client, &t).await?;
            if tree {
                let failed = client
                    .delete_tree(&object, all_versions, UnfileObject::parse(&unfile)?, continue_on_failure)
                    .await?;
                print(&json!({ "failed": failed }))
            } else {
                client.delete(&object, all_versions).await?;
                Ok(())
            }
        }
        Command::Nav {
            folder,
            option,
            depth,
            filter,
            order_by,
        } => {
            let folder = target(client, &folder).await?;
            let option = NavigationOption::parse(&option)?;
            match client
                .navigate(&folder, option, depth, filter.as_deref(), order_by.as_deref())
                .await?
            {
                Navigation::Parent(parent) => print_object(&parent),
                Navigation::Children(pager) => print(&pager.collect_all().await?),
                Navigation::Descendants(objects) => print(&objects),
                Navigation::Tree(tree) => print(&tree),
            }
        }
        Command::Parents { target: t, filter } => {
            let object = target(client, &t).await?;
            print(&client.get_parent_folders(&object, filter.as_deref()).await?)
        }
        Command::CheckedOut { filter, order_by } => {
            let pager = client
                .get_checkout_docs(filter.as_deref(), order_by.as_deref())
                .await?;
            print(&pager.collect_all().await?)
        }
        Command::Query {
            statement,
            all_versions,
            filter,
            order_by,
            limit,
        } => {
            let pager = client
                .query(&statement, all_versions, filter.as_deref(), order_by.as_deref())
                .await?;
            print(&take(pager, limit).await?)
        }
        Command::Changes {
            token,
            include_properties,
        } => print(&client.changelog(token.as_deref(), include_properties).await?),
        Command::Checkout { target: t } => {
            let document = target(client, &t).await?;
            let pwc = client.check_out(&document).await?;
            print(&json!({ "objectId": pwc }))
        }
        Command::CancelCheckout { target: t } => {
            client.cancel_check_out(&target(client, &t).await?).await?;
            Ok(())
        }
        Command::Checkin {
            target: t,
            minor,
            comment,
            file,
            mime_type,
            properties: pairs,
        } => {
            let pwc = target(client, &t).await?;
            let content = match file {
                Some(file) => Some(read_upload(&file, None, mime_type).await?),
                None => None,
            };
            let id = client
                .check_in(&pwc, !minor, &properties(pairs), content, comment.as_deref())
                .await?;
            print(&json!({ "objectId": id }))
        }
        Command::Versions { target: t, filter } => {
            let document = target(client, &t).await?;
            print(&client.get_all_versions(&document, filter.as_deref()).await?)
        }
        Command::Relationships { target: t } => {
            let object = target(client, &t).await?;
            print(&client.get_object_relationships(&object).await?)
        }
        Command::Relate {
            source,
            target: t,
            relationship_type,
        } => {
            let source = target(client, &source).await?;
            let destination = target(client, &t).await?;
            print_object(
                &client
                    .create_relationship(&source, &destination, &relationship_type)
                    .await?,
            )
        }
        Command::Acl { target: t } => print(&client.get_acl(&target(client, &t).await?).await?),
        Command::Permit {
            target: t,
            add,
            remove,
            propagation,
        } => {
            let object = target(client, &t).await?;
            let acl = client
                .apply_acl(&object, &aces(add), &aces(remove), AclPropagation::parse(&propagation)?)
                .await?;
            print(&acl)
        }
        Command::Policies { target: t } => {
            print(&client.get_applied_policies(&target(client, &t).await?).await?)
        }
        Command::ApplyPolicy { policy_id, target: t } => {
            let object = target(client, &t).await?;
            client
                .apply_policy(&ObjectId::from(policy_id.as_str()), &object)
                .await?;
            Ok(())
        }
    }
}
